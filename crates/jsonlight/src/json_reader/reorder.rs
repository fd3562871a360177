//! Canonical member order for buffered objects.
//!
//! Members are grouped by the property they belong to (a data property and
//! its `prop@anno` annotations form one group, every instance annotation is
//! a group of its own). Groups are then stably sorted by bucket, keeping
//! first-seen order inside a bucket:
//!
//! | bucket | members |
//! |---|---|
//! | 0 | `@odata.context` |
//! | 1 | `@odata.removed` |
//! | 2 | `@odata.type` |
//! | 3 | `@odata.id` |
//! | 4 | `@odata.etag` |
//! | 5 | other `@odata.*` |
//! | 6 | everything else |
//!
//! Inside a group, `odata.*` property annotations move in front of the
//! property; everything else keeps its relative position.

use core::iter::Peekable;
use std::collections::HashMap;

use crate::{
    annotations::{self, MemberName},
    error::{ReaderError, Result},
    token::Token,
};

struct Member {
    tokens: Vec<Token>,
    /// `odata.*` annotation of the group's property.
    leading: bool,
}

struct Group {
    bucket: u8,
    members: Vec<Member>,
}

fn bucket(instance_annotation: &str) -> u8 {
    match instance_annotation {
        annotations::CONTEXT => 0,
        annotations::REMOVED => 1,
        annotations::TYPE => 2,
        annotations::ID => 3,
        annotations::ETAG => 4,
        a if annotations::is_odata(a) => 5,
        _ => 6,
    }
}

/// Reorders the members of an object whose `{` has been consumed. `body`
/// runs up to and including the matching `}`; nested objects are reordered
/// too. `depth` is the nesting level of the object itself.
pub(crate) fn reorder_object(body: Vec<Token>, depth: usize, max_depth: usize) -> Result<Vec<Token>> {
    let len = body.len();
    let mut tokens = body.into_iter().peekable();
    let mut out = Vec::with_capacity(len);
    reorder_members(&mut tokens, &mut out, depth, max_depth)?;
    if tokens.next().is_some() {
        return Err(ReaderError::UnbalancedNesting);
    }
    Ok(out)
}

fn reorder_members<I>(tokens: &mut Peekable<I>, out: &mut Vec<Token>, depth: usize, max_depth: usize) -> Result<()>
where
    I: Iterator<Item = Token>,
{
    if depth > max_depth {
        return Err(ReaderError::RecursionDepthExceeded { max: max_depth });
    }

    let mut groups: Vec<Group> = Vec::new();
    // key -> position in `groups`
    let mut index: HashMap<String, usize> = HashMap::new();
    loop {
        let name = match tokens.next() {
            Some(Token::EndObject) => break,
            Some(Token::Property(name)) => name,
            _ => return Err(ReaderError::UnbalancedNesting),
        };

        let (key, bucket, leading) = match MemberName::parse(&name) {
            MemberName::InstanceAnnotation(a) => (format!("@{a}"), bucket(&a), false),
            MemberName::PropertyAnnotation { property, annotation } => {
                let bucket = property
                    .strip_prefix('@')
                    .map_or(6, |a| bucket(&annotations::normalize(a)));
                let key = match property.strip_prefix('@') {
                    Some(a) => format!("@{}", annotations::normalize(a)),
                    None => property,
                };
                (key, bucket, annotations::is_odata(&annotation))
            }
            MemberName::Data(n) | MemberName::MetadataReference(n) => (n, 6, false),
        };

        let mut member = Member {
            tokens: vec![Token::Property(name)],
            leading,
        };
        copy_value(tokens, &mut member.tokens, depth, max_depth)?;

        match index.get(&key) {
            Some(&at) => groups[at].members.push(member),
            None => {
                index.insert(key, groups.len());
                groups.push(Group {
                    bucket,
                    members: vec![member],
                });
            }
        }
    }

    // stable: equal buckets keep first-seen order
    groups.sort_by_key(|g| g.bucket);
    for mut group in groups {
        group.members.sort_by_key(|m| !m.leading);
        for member in group.members {
            out.extend(member.tokens);
        }
    }
    out.push(Token::EndObject);
    Ok(())
}

fn copy_value<I>(tokens: &mut Peekable<I>, out: &mut Vec<Token>, depth: usize, max_depth: usize) -> Result<()>
where
    I: Iterator<Item = Token>,
{
    match tokens.next() {
        Some(t @ Token::Primitive(_)) => out.push(t),
        Some(Token::StartObject) => {
            out.push(Token::StartObject);
            reorder_members(tokens, out, depth + 1, max_depth)?;
        }
        Some(Token::StartArray) => {
            if depth + 1 > max_depth {
                return Err(ReaderError::RecursionDepthExceeded { max: max_depth });
            }
            out.push(Token::StartArray);
            while tokens.peek() != Some(&Token::EndArray) {
                if tokens.peek().is_none() {
                    return Err(ReaderError::UnbalancedNesting);
                }
                copy_value(tokens, out, depth + 1, max_depth)?;
            }
            tokens.next();
            out.push(Token::EndArray);
        }
        _ => return Err(ReaderError::UnbalancedNesting),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::reorder_object;
    use crate::{
        error::ReaderError,
        token::{Token, Tokenizer},
    };

    /// Member names of the reordered top-level object.
    fn order(json: &str) -> Vec<String> {
        let mut tokenizer = Tokenizer::from_complete(json);
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::StartObject));
        let mut body = Vec::new();
        while let Some(t) = tokenizer.next_token().unwrap() {
            if t == Token::EndOfInput {
                break;
            }
            body.push(t);
        }
        let mut depth = 0_i32;
        reorder_object(body, 1, 100)
            .unwrap()
            .into_iter()
            .filter_map(|t| {
                match &t {
                    Token::StartObject | Token::StartArray => depth += 1,
                    Token::EndObject | Token::EndArray => depth -= 1,
                    Token::Property(name) if depth == 0 => return Some(name.clone()),
                    _ => {}
                }
                None
            })
            .collect()
    }

    #[test]
    fn buckets_then_first_seen_order() {
        let names = order(
            r##"{"b":1,"@ns.custom":2,"@odata.etag":"e","@odata.id":"i","@odata.nextLink":"n",
                "@odata.type":"#T","a":3,"@odata.removed":{},"@odata.context":"c"}"##,
        );
        assert_eq!(
            names,
            [
                "@odata.context",
                "@odata.removed",
                "@odata.type",
                "@odata.id",
                "@odata.etag",
                "@odata.nextLink",
                "b",
                "@ns.custom",
                "a"
            ]
        );
    }

    #[test]
    fn odata_property_annotations_precede_their_property() {
        let names = order(r##"{"Id":1,"Id@ns.note":"x","Id@odata.type":"#Int32","Name":"n"}"##);
        assert_eq!(names, ["Id@odata.type", "Id", "Id@ns.note", "Name"]);
    }

    #[test]
    fn late_annotations_join_their_property() {
        let names = order(r##"{"a":1,"b":2,"a@ns.x":3,"b@odata.type":"#Int32","@ns.y":4,"c":5}"##);
        assert_eq!(names, ["a", "a@ns.x", "b@odata.type", "b", "@ns.y", "c"]);
    }

    #[test]
    fn nested_objects_are_reordered_too() {
        let mut tokenizer = Tokenizer::from_complete(r##"{"a":[{"x":1,"@odata.type":"#T"}]}"##);
        tokenizer.next_token().unwrap();
        let mut body = Vec::new();
        while let Some(t) = tokenizer.next_token().unwrap() {
            if t == Token::EndOfInput {
                break;
            }
            body.push(t);
        }
        let out = reorder_object(body, 1, 100).unwrap();
        let inner: Vec<_> = out
            .iter()
            .filter_map(|t| match t {
                Token::Property(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(inner, ["a", "@odata.type", "x"]);
    }

    #[test]
    fn depth_is_bounded() {
        let json = format!("{{\"a\":{}1{}}}", "[".repeat(10), "]".repeat(10));
        let mut tokenizer = Tokenizer::from_complete(&json);
        tokenizer.next_token().unwrap();
        let mut body = Vec::new();
        while let Some(t) = tokenizer.next_token().unwrap() {
            if t == Token::EndOfInput {
                break;
            }
            body.push(t);
        }
        assert!(matches!(
            reorder_object(body, 1, 5),
            Err(ReaderError::RecursionDepthExceeded { max: 5 })
        ));
    }
}
