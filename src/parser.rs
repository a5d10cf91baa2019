//! Cursor-style typed façade over an asset descriptor's XML document (§4.3).
//!
//! The descriptor's actual DOM (a parsed [`roxmltree::Document`]) is never
//! exposed to callers — only this cursor, matching §9's "parser DSL" design
//! note: the chained C++ parser builder becomes a cursor plus a small set
//! of combinator methods, and the `message_interface` argument becomes a
//! borrow of the cursor's own diagnostics sink.
//!
//! Any `Fail`-level message poisons the cursor: every subsequent call
//! returns early without touching the document, matching §4.3's exact
//! wording ("further calls are no-ops returning early").

use std::str::FromStr;

use roxmltree::{Document, Node};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Success,
    Warning,
    Error,
    Fail,
}

#[derive(Debug, Clone)]
pub struct ParserMessage {
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    Warnings,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub status: ParseStatus,
    pub messages: Vec<ParserMessage>,
}

/// A cursor positioned somewhere inside an asset descriptor tree.
pub struct AssetParserCursor<'a> {
    stack: Vec<Node<'a, 'a>>,
    messages: Vec<ParserMessage>,
    poisoned: bool,
}

impl<'a> AssetParserCursor<'a> {
    pub fn new(document: &'a Document<'a>) -> Self {
        AssetParserCursor {
            stack: vec![document.root_element()],
            messages: Vec::new(),
            poisoned: false,
        }
    }

    fn push_message(&mut self, level: MessageLevel, text: impl Into<String>) {
        if level == MessageLevel::Fail {
            self.poisoned = true;
        }
        self.messages.push(ParserMessage {
            level,
            text: text.into(),
        });
    }

    fn poisoned_error(&self) -> Error {
        Error::parser_fail("parser is poisoned by a prior fail-level message")
    }

    fn current(&self) -> Node<'a, 'a> {
        *self.stack.last().expect("cursor stack is never empty")
    }

    fn find_child(&self, name: &str) -> Option<Node<'a, 'a>> {
        self.current()
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == name)
    }

    fn find_children<'b>(&'b self, name: &'b str) -> impl Iterator<Item = Node<'a, 'a>> + 'b {
        self.current()
            .children()
            .filter(move |n| n.is_element() && n.tag_name().name() == name)
    }

    /// Enter the document root and, if given, validate its `Info.type`
    /// attribute against `expected_type`.
    pub fn begin_asset(&mut self, expected_type: Option<&str>) -> Result<()> {
        let root = self.current();
        if root.tag_name().name() != "IonAsset" {
            self.push_message(
                MessageLevel::Fail,
                format!("expected root element <IonAsset>, found <{}>", root.tag_name().name()),
            );
            return Err(self.poisoned_error());
        }
        if let Some(expected) = expected_type {
            self.expect_type(expected)?;
        }
        Ok(())
    }

    /// Validate the `Info` child's `type` attribute without otherwise
    /// moving the cursor.
    pub fn expect_type(&mut self, expected: &str) -> Result<()> {
        if self.poisoned {
            return Err(self.poisoned_error());
        }
        let info = self.find_child("Info").ok_or_else(|| {
            Error::parser_fail("missing required <Info> element")
        });
        let info = match info {
            Ok(n) => n,
            Err(e) => {
                self.push_message(MessageLevel::Fail, e.to_string());
                return Err(self.poisoned_error());
            }
        };
        match info.attribute("type") {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => {
                self.push_message(
                    MessageLevel::Fail,
                    format!("expected asset type \"{expected}\", found \"{actual}\""),
                );
                Err(self.poisoned_error())
            }
            None => {
                self.push_message(MessageLevel::Fail, "<Info> is missing the \"type\" attribute");
                Err(self.poisoned_error())
            }
        }
    }

    /// Enter a required child element by tag name.
    pub fn enter_node(&mut self, name: &str) -> Result<()> {
        if self.poisoned {
            return Err(self.poisoned_error());
        }
        match self.find_child(name) {
            Some(node) => {
                self.stack.push(node);
                Ok(())
            }
            None => {
                self.push_message(MessageLevel::Fail, format!("missing required <{name}> element"));
                Err(self.poisoned_error())
            }
        }
    }

    /// Enter an optional child element by tag name, silently.
    pub fn try_enter_node(&mut self, name: &str) -> bool {
        if self.poisoned {
            return false;
        }
        match self.find_child(name) {
            Some(node) => {
                self.stack.push(node);
                true
            }
            None => false,
        }
    }

    /// Leave the current node, returning to its parent.
    pub fn exit_node(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Visit every child element named `name`, in document order.
    pub fn enter_each_node(&mut self, name: &str, mut for_each: impl FnMut(&mut Self)) {
        if self.poisoned {
            return;
        }
        let children: Vec<_> = self.find_children(name).collect();
        for child in children {
            self.stack.push(child);
            for_each(self);
            self.stack.pop();
        }
    }

    /// Read an attribute of the current node, silently.
    pub fn try_attribute(&self, name: &str) -> Option<&'a str> {
        self.current().attribute(name)
    }

    /// Read a required attribute of the current node; records a `fail`
    /// message and poisons the cursor if absent.
    pub fn require_attribute(&mut self, name: &str) -> Result<&'a str> {
        if self.poisoned {
            return Err(self.poisoned_error());
        }
        match self.current().attribute(name) {
            Some(v) => Ok(v),
            None => {
                let node_name = self.current().tag_name().name().to_string();
                self.push_message(
                    MessageLevel::Fail,
                    format!("<{node_name}> is missing the \"{name}\" attribute"),
                );
                Err(self.poisoned_error())
            }
        }
    }

    /// Parse a required attribute's string value as `T`; a parse failure
    /// is recorded as a `fail` message, not silently ignored.
    pub fn parse_attribute_typed<T>(&mut self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.require_attribute(name)?;
        raw.parse::<T>().map_err(|e| {
            self.push_message(
                MessageLevel::Fail,
                format!("attribute \"{name}\" = \"{raw}\" failed to parse: {e}"),
            );
            self.poisoned_error()
        })
    }

    /// Enter `name`, read its `value` attribute, exit. Descriptor elements
    /// like `Name{value}` and `Default/Min/Max{value}` follow this shape.
    pub fn parse_node_value(&mut self, name: &str) -> Result<&'a str> {
        self.enter_node(name)?;
        let value = self.require_attribute("value");
        self.exit_node();
        value
    }

    /// Like [`parse_node_value`](Self::parse_node_value), but silent if
    /// the node itself is absent (still fails if present without `value`).
    pub fn try_parse_node_value(&mut self, name: &str) -> Option<Result<&'a str>> {
        if !self.try_enter_node(name) {
            return None;
        }
        let value = self.require_attribute("value");
        self.exit_node();
        Some(value)
    }

    /// Assert the current node carries every named attribute, without
    /// reading their values.
    pub fn expect_attributes(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.require_attribute(name)?;
        }
        Ok(())
    }

    pub fn has_failed(&self) -> bool {
        self.poisoned
    }

    /// Consume the cursor and report its accumulated diagnostics.
    pub fn finalize(self) -> ParseOutcome {
        let status = if self.poisoned {
            ParseStatus::Failed
        } else if self
            .messages
            .iter()
            .any(|m| matches!(m.level, MessageLevel::Warning | MessageLevel::Error))
        {
            ParseStatus::Warnings
        } else {
            ParseStatus::Ok
        };
        ParseOutcome {
            status,
            messages: self.messages,
        }
    }
}
