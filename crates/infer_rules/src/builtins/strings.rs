//! String construction and matching.

use std::sync::Arc;

use infer_graph::Node;
use log::warn;
use regex::Regex;

use super::{boxed, lexical};
use crate::builtin::{Builtin, RuleContext};

/// Concatenates the lexical forms of all but the last argument and binds
/// the last one to the result.
struct Concat {
    name: &'static str,
    make: fn(String) -> Node,
}

impl Builtin for Concat {
    fn name(&self) -> &str {
        self.name
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let Some((out, parts)) = args.split_last() else {
            return false;
        };
        let mut joined = String::new();
        for part in parts {
            match lexical(part) {
                Some(s) => joined.push_str(&s),
                None => return false,
            }
        }
        ctx.bind(out, &(self.make)(joined))
    }
}

/// `regex(text, pattern, ?group1, ...)`: the whole text matches the pattern;
/// capture groups are bound to the trailing arguments.
struct RegexMatch;

impl Builtin for RegexMatch {
    fn name(&self) -> &str {
        "regex"
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [text, pattern, groups @ ..] = args else {
            return false;
        };
        let (Some(text), Some(pattern)) = (lexical(text), lexical(pattern)) else {
            return false;
        };
        let re = match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) => re,
            Err(e) => {
                warn!("invalid pattern in regex builtin: {}", e);
                return false;
            }
        };
        let Some(captures) = re.captures(&text) else {
            return false;
        };
        groups.iter().enumerate().all(|(i, group)| {
            let value = captures.get(i + 1).map_or("", |m| m.as_str());
            ctx.bind(group, &Node::literal(value))
        })
    }
}

/// `strlen(text, ?length)`, counting characters.
struct StrLen;

impl Builtin for StrLen {
    fn name(&self) -> &str {
        "strlen"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [text, out] = args else {
            return false;
        };
        match lexical(text) {
            Some(s) => ctx.bind(out, &Node::integer(s.chars().count() as i64)),
            None => false,
        }
    }
}

pub(crate) fn builtins() -> Vec<Arc<dyn Builtin>> {
    vec![
        boxed(Concat {
            name: "strConcat",
            make: |s| Node::literal(s),
        }),
        boxed(Concat {
            name: "uriConcat",
            make: |s| Node::uri(s),
        }),
        boxed(RegexMatch),
        boxed(StrLen),
    ]
}
