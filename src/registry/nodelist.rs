//! Node-list expression parser.
//!
//! Grammar (spec.md §4.1):
//! ```text
//! list  := term (',' term)*
//! term  := (literal | '[' range (',' range)* ']')+
//! range := DIGITS '-' DIGITS
//! ```
//! Both sides of a range must have identical digit counts (zero-padding is
//! significant: `n[001-100]` expands to `n001`..`n100`, not `n1`..`n100`).
//! A bare `*` matches every host.

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Range { start: u64, end: u64, width: usize },
}

#[derive(Debug, Clone)]
struct Term {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
pub enum NodeList {
    Wildcard,
    Terms(Vec<Term>),
}

impl NodeList {
    pub fn parse(expr: &str) -> Result<NodeList> {
        let expr = expr.trim();
        if expr == "*" {
            return Ok(NodeList::Wildcard);
        }
        let mut terms = Vec::new();
        for part in split_top_level(expr, ',') {
            terms.push(parse_term(&part)?);
        }
        if terms.is_empty() {
            return Err(CoreError::InvalidNodeList(format!(
                "empty node-list expression: {expr:?}"
            )));
        }
        Ok(NodeList::Terms(terms))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, NodeList::Wildcard)
    }

    pub fn contains(&self, host: &str) -> bool {
        match self {
            NodeList::Wildcard => true,
            NodeList::Terms(terms) => terms.iter().any(|t| term_matches(t, host)),
        }
    }

    pub fn expand(&self) -> Vec<String> {
        match self {
            NodeList::Wildcard => Vec::new(),
            NodeList::Terms(terms) => terms.iter().flat_map(expand_term).collect(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            NodeList::Wildcard => 0,
            NodeList::Terms(_) => self.expand().len(),
        }
    }
}

/// Split on `sep` but not inside `[...]` brackets.
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '[' => {
                depth += 1;
                cur.push(c);
            }
            ']' => {
                depth -= 1;
                cur.push(c);
            }
            c if c == sep && depth == 0 => {
                out.push(std::mem::take(&mut cur));
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn parse_term(s: &str) -> Result<Term> {
    let mut segments = Vec::new();
    let mut chars = s.char_indices().peekable();
    let mut literal = String::new();
    while let Some((_, c)) = chars.next() {
        if c == '[' {
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let mut bracket = String::new();
            let mut closed = false;
            for (_, c2) in chars.by_ref() {
                if c2 == ']' {
                    closed = true;
                    break;
                }
                bracket.push(c2);
            }
            if !closed {
                return Err(CoreError::InvalidNodeList(format!(
                    "unterminated '[' in term {s:?}"
                )));
            }
            if bracket.trim().is_empty() {
                return Err(CoreError::InvalidNodeList(format!(
                    "empty range in term {s:?}"
                )));
            }
            for range_str in split_top_level(&bracket, ',') {
                segments.push(parse_range(&range_str, s)?);
            }
        } else {
            literal.push(c);
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    if segments.is_empty() {
        return Err(CoreError::InvalidNodeList(format!("empty term {s:?}")));
    }
    Ok(Term { segments })
}

fn parse_range(s: &str, term: &str) -> Result<Segment> {
    let (lo, hi) = s.split_once('-').ok_or_else(|| {
        CoreError::InvalidNodeList(format!("range {s:?} in {term:?} missing '-'"))
    })?;
    if lo.is_empty() || hi.is_empty() || !lo.chars().all(|c| c.is_ascii_digit()) || !hi.chars().all(|c| c.is_ascii_digit())
    {
        return Err(CoreError::InvalidNodeList(format!(
            "range {s:?} in {term:?} must be DIGITS-DIGITS"
        )));
    }
    if lo.len() != hi.len() {
        return Err(CoreError::InvalidNodeList(format!(
            "range {s:?} in {term:?}: endpoints must have identical digit counts"
        )));
    }
    let start: u64 = lo.parse().unwrap();
    let end: u64 = hi.parse().unwrap();
    if start > end {
        return Err(CoreError::InvalidNodeList(format!(
            "range {s:?} in {term:?}: start > end"
        )));
    }
    Ok(Segment::Range {
        start,
        end,
        width: lo.len(),
    })
}

fn expand_term(term: &Term) -> Vec<String> {
    let mut acc = vec![String::new()];
    for seg in &term.segments {
        let mut next = Vec::new();
        match seg {
            Segment::Literal(lit) => {
                for prefix in &acc {
                    next.push(format!("{prefix}{lit}"));
                }
            }
            Segment::Range { start, end, width } => {
                for prefix in &acc {
                    for n in *start..=*end {
                        next.push(format!("{prefix}{n:0width$}", width = width));
                    }
                }
            }
        }
        acc = next;
    }
    acc
}

fn term_matches(term: &Term, host: &str) -> bool {
    // A term with no ranges is a single literal; otherwise fall back to
    // full expansion. Sub-cluster node-lists are small enough in practice
    // (tens to low thousands of hosts) that this is not a hot path.
    if term.segments.len() == 1 {
        if let Segment::Literal(lit) = &term.segments[0] {
            return lit == host;
        }
    }
    expand_term(term).iter().any(|h| h == host)
}
