//! Relation expressions used by the `eager` and `join` directives.
//!
//! ```text
//! children                 one relation
//! children.pets            nested relation
//! [parent, children.pets]  several relations
//! children.[pets, movies]  several nested relations
//! *                        any relation (only meaningful in allowed expressions)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use super::reference::is_identifier;
use crate::errors::FindError;
use crate::schema::Schema;

const MAX_NESTING: usize = 32;
const WILDCARD: &str = "*";

/// One level of a relation expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationNode {
    children: BTreeMap<String, RelationNode>,
}

impl RelationNode {
    pub fn children(&self) -> impl Iterator<Item = (&str, &RelationNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    fn is_subset_of(&self, allowed: &RelationNode) -> bool {
        if allowed.children.contains_key(WILDCARD) {
            return true;
        }
        self.children.iter().all(|(name, node)| {
            allowed
                .children
                .get(name)
                .is_some_and(|allowed_node| node.is_subset_of(allowed_node))
        })
    }

    fn validate(&self, schema: &Schema, table: &str, raw: &str) -> Result<(), FindError> {
        let entity = schema.require(table)?;
        for (name, node) in &self.children {
            if name == WILDCARD {
                continue;
            }
            let relation = entity.get_relation(name).ok_or_else(|| {
                FindError::unknown_reference(format!(
                    "unknown relation \"{name}\" in relation expression \"{raw}\""
                ))
            })?;
            node.validate(schema, &relation.related, raw)?;
        }
        Ok(())
    }
}

/// A parsed relation expression. Keeps its source text so it can be handed
/// to a loader unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationExpression {
    raw: String,
    root: RelationNode,
}

impl RelationExpression {
    /// Parse a relation expression.
    ///
    /// # Errors
    ///
    /// Syntax error for empty input, unbalanced brackets, empty names or
    /// trailing characters.
    pub fn parse(input: &str) -> Result<Self, FindError> {
        let mut parser = Parser {
            input: input.as_bytes(),
            pos: 0,
        };
        let mut root = RelationNode::default();
        parser.expression(&mut root, 0)?;
        parser.skip_whitespace();
        if parser.pos != parser.input.len() {
            return Err(parser.error("unexpected character"));
        }
        Ok(Self {
            raw: input.trim().to_string(),
            root,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn root(&self) -> &RelationNode {
        &self.root
    }

    /// Whether every relation path of `self` is admitted by `allowed`.
    #[must_use]
    pub fn is_subset_of(&self, allowed: &RelationExpression) -> bool {
        self.root.is_subset_of(&allowed.root)
    }

    /// Check every named relation exists, starting from entity `root`.
    ///
    /// # Errors
    ///
    /// Unknown-reference error naming the first unknown relation.
    pub fn validate(&self, schema: &Schema, root: &str) -> Result<(), FindError> {
        self.root.validate(schema, root, &self.raw)
    }
}

impl fmt::Display for RelationExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, what: &str) -> FindError {
        FindError::syntax(format!(
            "{what} at position {} in relation expression \"{}\"",
            self.pos,
            String::from_utf8_lossy(self.input)
        ))
    }

    fn skip_whitespace(&mut self) {
        while self.input.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    fn expression(&mut self, into: &mut RelationNode, depth: usize) -> Result<(), FindError> {
        if depth > MAX_NESTING {
            return Err(self.error("relation expression nested too deeply"));
        }
        if self.peek() == Some(b'[') {
            self.list(into, depth)
        } else {
            self.chain(into, depth)
        }
    }

    fn list(&mut self, into: &mut RelationNode, depth: usize) -> Result<(), FindError> {
        self.pos += 1;
        loop {
            self.expression(into, depth + 1)?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn chain(&mut self, into: &mut RelationNode, depth: usize) -> Result<(), FindError> {
        let name = self.name()?;
        let child = into.children.entry(name).or_default();
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.expression(child, depth + 1)?;
        }
        Ok(())
    }

    fn name(&mut self) -> Result<String, FindError> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .input
            .get(self.pos)
            .is_some_and(|&c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c == b'*')
        {
            self.pos += 1;
        }
        let name = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if name == WILDCARD || is_identifier(&name) {
            Ok(name)
        } else {
            Err(self.error("expected relation name"))
        }
    }
}
