//! A constrained XPath 1.0 subset (spec §3 expansion note): child and
//! descendant axis steps (`/`, `//`), element-name or `*` tests, `@attr`
//! and positional predicates, and a terminal `text()` or `@attr` step.
//!
//! This is deliberately not a general XPath engine — just enough of the
//! grammar to address the cases real site templates actually need
//! (`//div[@class='content']/p`, `article/h1[1]`, `//meta[@name='author']/@content`).

use scraper::ElementRef;

#[derive(Debug, Clone)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone)]
enum Predicate {
    Position(usize),
    AttrEquals(String, String),
    AttrExists(String),
}

#[derive(Debug, Clone)]
enum Step {
    Element {
        axis: Axis,
        name: String,
        predicates: Vec<Predicate>,
    },
    Text { axis: Axis },
    Attribute(String),
}

/// Parse and evaluate an XPath expression against `root`, returning the
/// matched elements' text content, or attribute values if the expression
/// ends in `@attr` or `text()`.
pub fn evaluate<'a>(expr: &str, root: ElementRef<'a>) -> Result<Vec<String>, String> {
    let steps = parse(expr)?;
    let mut context: Vec<ElementRef<'a>> = vec![root];
    let mut attr_target: Option<String> = None;
    let mut text_only = false;

    for step in &steps {
        match step {
            Step::Element { axis, name, predicates } => {
                context = apply_element_step(&context, axis, name, predicates);
            }
            Step::Text { axis } => {
                // `text()` as a non-terminal step has no useful meaning in
                // this subset; only the terminal case is supported.
                let _ = axis;
                text_only = true;
            }
            Step::Attribute(attr) => {
                attr_target = Some(attr.clone());
            }
        }
    }

    if let Some(attr) = attr_target {
        Ok(context.iter().filter_map(|el| el.value().attr(&attr)).map(String::from).collect())
    } else if text_only {
        Ok(context.iter().map(|el| el.text().collect::<String>()).collect())
    } else {
        Ok(context.iter().map(|el| el.text().collect::<String>()).collect())
    }
}

/// Like [`evaluate`] but returns the first matched *element* rather than
/// text, for resolving a content container. Only meaningful for
/// expressions whose last step is an element step (no terminal `text()`
/// or `@attr`).
pub fn evaluate_element<'a>(expr: &str, root: ElementRef<'a>) -> Option<ElementRef<'a>> {
    let steps = parse(expr).ok()?;
    let mut context: Vec<ElementRef<'a>> = vec![root];
    for step in &steps {
        match step {
            Step::Element { axis, name, predicates } => {
                context = apply_element_step(&context, axis, name, predicates);
            }
            Step::Text { .. } | Step::Attribute(_) => return None,
        }
    }
    context.into_iter().next()
}

fn apply_element_step<'a>(
    context: &[ElementRef<'a>],
    axis: &Axis,
    name: &str,
    predicates: &[Predicate],
) -> Vec<ElementRef<'a>> {
    let mut out = Vec::new();
    for node in context {
        let candidates: Vec<ElementRef<'a>> = match axis {
            Axis::Child => node.children().filter_map(ElementRef::wrap).collect(),
            Axis::Descendant => node.descendants().filter_map(ElementRef::wrap).collect(),
        };
        let matched: Vec<ElementRef<'a>> = candidates
            .into_iter()
            .filter(|el| name == "*" || el.value().name() == name)
            .collect();
        let filtered = apply_predicates(matched, predicates);
        out.extend(filtered);
    }
    out
}

fn apply_predicates<'a>(nodes: Vec<ElementRef<'a>>, predicates: &[Predicate]) -> Vec<ElementRef<'a>> {
    if predicates.is_empty() {
        return nodes;
    }
    nodes
        .into_iter()
        .enumerate()
        .filter(|(idx, el)| {
            predicates.iter().all(|p| match p {
                Predicate::Position(n) => idx + 1 == *n,
                Predicate::AttrEquals(attr, val) => el.value().attr(attr) == Some(val.as_str()),
                Predicate::AttrExists(attr) => el.value().attr(attr).is_some(),
            })
        })
        .map(|(_, el)| el)
        .collect()
}

fn parse(expr: &str) -> Result<Vec<Step>, String> {
    let expr = expr.trim();
    let mut steps = Vec::new();
    let mut remaining = expr;
    let mut pending_axis = Axis::Child;

    if let Some(stripped) = remaining.strip_prefix("//") {
        pending_axis = Axis::Descendant;
        remaining = stripped;
    } else if let Some(stripped) = remaining.strip_prefix('/') {
        remaining = stripped;
    }

    for raw_step in split_steps(remaining) {
        if raw_step.is_empty() {
            pending_axis = Axis::Descendant;
            continue;
        }
        if let Some(attr) = raw_step.strip_prefix('@') {
            steps.push(Step::Attribute(attr.to_string()));
            continue;
        }
        if raw_step == "text()" {
            steps.push(Step::Text { axis: pending_axis.clone() });
            pending_axis = Axis::Child;
            continue;
        }

        let (name, predicate_strs) = split_predicates(raw_step)?;
        let predicates = predicate_strs
            .iter()
            .map(|p| parse_predicate(p))
            .collect::<Result<Vec<_>, _>>()?;
        steps.push(Step::Element {
            axis: pending_axis.clone(),
            name,
            predicates,
        });
        pending_axis = Axis::Child;
    }

    if steps.is_empty() {
        return Err(format!("empty xpath expression: {expr:?}"));
    }
    Ok(steps)
}

/// Split on `/`, treating `//` as an empty segment marking descendant axis
/// for the following step (handled by the caller).
fn split_steps(s: &str) -> Vec<&str> {
    s.split('/').collect()
}

fn split_predicates(step: &str) -> Result<(String, Vec<String>), String> {
    let mut name = String::new();
    let mut predicates = Vec::new();
    let mut chars = step.char_indices().peekable();
    let mut in_bracket = false;
    let mut current = String::new();

    for (_, ch) in chars.by_ref() {
        match ch {
            '[' if !in_bracket => {
                in_bracket = true;
            }
            ']' if in_bracket => {
                predicates.push(current.clone());
                current.clear();
                in_bracket = false;
            }
            _ if in_bracket => current.push(ch),
            _ => name.push(ch),
        }
    }
    if in_bracket {
        return Err(format!("unterminated predicate in xpath step {step:?}"));
    }
    Ok((name, predicates))
}

fn parse_predicate(raw: &str) -> Result<Predicate, String> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<usize>() {
        return Ok(Predicate::Position(n));
    }
    if let Some(attr_expr) = raw.strip_prefix('@') {
        if let Some((attr, value)) = attr_expr.split_once('=') {
            let value = value.trim_matches(|c| c == '\'' || c == '"');
            return Ok(Predicate::AttrEquals(attr.to_string(), value.to_string()));
        }
        return Ok(Predicate::AttrExists(attr_expr.to_string()));
    }
    Err(format!("unsupported xpath predicate: {raw:?}"))
}
