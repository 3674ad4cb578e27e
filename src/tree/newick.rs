//! Newick reading and writing.
//!
//! ```text
//! tree     ::= subtree [';']
//! subtree  ::= '(' subtree {',' subtree} ')' [label] [':' length]
//!            | label [':' length]
//! ```
//!
//! Labels may be single-quoted (`''` escapes a quote). `[...]` comments
//! are skipped wherever whitespace is allowed. Internal labels are read as
//! bootstrap values; leaf labels are track file names.

use std::io::{self, Write};

use super::{NodeId, PhylogenyTree, TreeError};
use crate::genomics::TrackList;
use crate::util::{format_length, Cursor};

/// Bytes that end an unquoted label.
const LABEL_DELIMITERS: &[u8] = b"(),:;[";

/// Parse a Newick tree.
///
/// When `tracks` is empty, leaf labels create tracks in order of
/// appearance; otherwise every label must name a loaded track.
pub fn parse(text: &str, tracks: &mut TrackList) -> Result<PhylogenyTree, TreeError> {
    let mut parser = NewickParser {
        cursor: Cursor::new(text.as_bytes()),
        tree: PhylogenyTree::new(),
        create_tracks: tracks.is_empty(),
        tracks,
    };

    parser.skip_trivia()?;
    if parser.cursor.is_at_end() || parser.cursor.peek() == Some(b';') {
        return Err(TreeError::Empty);
    }
    let root = parser.subtree()?;
    parser.skip_trivia()?;
    parser.cursor.eat(b';');

    let mut tree = parser.tree;
    tree.set_root(root);
    Ok(tree)
}

struct NewickParser<'a, 't> {
    cursor: Cursor<'a>,
    tree: PhylogenyTree,
    tracks: &'t mut TrackList,
    create_tracks: bool,
}

impl NewickParser<'_, '_> {
    fn error(&self, reason: impl Into<String>) -> TreeError {
        TreeError::Syntax {
            position: self.cursor.position(),
            reason: reason.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), TreeError> {
        loop {
            self.cursor.skip_whitespace();
            if !self.cursor.eat(b'[') {
                return Ok(());
            }
            if self.cursor.take_until(b']').is_none() {
                return Err(self.error("unterminated comment"));
            }
            self.cursor.bump();
        }
    }

    fn subtree(&mut self) -> Result<NodeId, TreeError> {
        self.skip_trivia()?;
        if self.cursor.eat(b'(') {
            let mut children = vec![self.subtree()?];
            loop {
                self.skip_trivia()?;
                match self.cursor.bump() {
                    Some(b',') => children.push(self.subtree()?),
                    Some(b')') => break,
                    Some(byte) => return Err(self.error(format!("expected ',' or ')', found '{}'", byte as char))),
                    None => return Err(self.error("unbalanced parentheses")),
                }
            }
            let label = self.label()?;
            let bootstrap = if label.is_empty() {
                0.0
            } else {
                label
                    .parse()
                    .map_err(|_| self.error(format!("internal label \"{label}\" is not a support value")))?
            };
            let distance = self.length()?;
            Ok(self.tree.add_internal(children, distance, bootstrap))
        } else {
            let label = self.label()?;
            if label.is_empty() {
                return Err(self.error("leaf without a label"));
            }
            let track = if self.create_tracks {
                self.tracks.index_or_add(&label)
            } else {
                self.tracks.index_by_file(&label)?
            };
            let distance = self.length()?;
            Ok(self.tree.add_leaf(track, distance))
        }
    }

    fn label(&mut self) -> Result<String, TreeError> {
        self.skip_trivia()?;
        if !self.cursor.eat(b'\'') {
            let raw = self
                .cursor
                .take_while(|byte| !LABEL_DELIMITERS.contains(&byte));
            return Ok(String::from_utf8_lossy(raw).trim().to_string());
        }

        let mut label = Vec::new();
        loop {
            let Some(part) = self.cursor.take_until(b'\'') else {
                return Err(self.error("unterminated quoted label"));
            };
            label.extend_from_slice(part);
            self.cursor.bump();
            if self.cursor.eat(b'\'') {
                label.push(b'\'');
            } else {
                return Ok(String::from_utf8_lossy(&label).into_owned());
            }
        }
    }

    fn length(&mut self) -> Result<f64, TreeError> {
        self.skip_trivia()?;
        if !self.cursor.eat(b':') {
            return Ok(0.0);
        }
        self.skip_trivia()?;
        let raw = self
            .cursor
            .take_while(|byte| byte.is_ascii_digit() || matches!(byte, b'.' | b'-' | b'+' | b'e' | b'E'));
        let text = String::from_utf8_lossy(raw);
        text.parse()
            .map_err(|_| self.error(format!("invalid branch length \"{text}\"")))
    }
}

/// Quote `label` if it holds characters Newick gives meaning to.
fn escape_label(label: &str) -> String {
    let needs_quotes = label.is_empty()
        || label
            .bytes()
            .any(|byte| byte.is_ascii_whitespace() || byte == b'\'' || LABEL_DELIMITERS.contains(&byte) || byte == b']');
    if needs_quotes {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

impl PhylogenyTree {
    /// Write the tree as one Newick line with track files as leaf labels.
    ///
    /// Branch lengths are scaled by the multiplier when `use_mult` is set.
    pub fn write_newick<W: Write>(&self, out: &mut W, tracks: &TrackList, use_mult: bool) -> io::Result<()> {
        let Some(root) = self.root() else {
            return Ok(());
        };
        let scale = if use_mult { self.multiplier() } else { 1.0 };
        let mut text = String::new();
        self.render_node(root, tracks, scale, &mut text);
        text.push_str(";\n");
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    /// Render the tree as a Newick string.
    pub fn to_newick(&self, tracks: &TrackList, use_mult: bool) -> String {
        let mut buffer = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_newick(&mut buffer, tracks, use_mult);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn render_node(&self, id: NodeId, tracks: &TrackList, scale: f64, text: &mut String) {
        let node = self.node(id);
        if node.is_leaf() {
            let label = node
                .track()
                .and_then(|track| tracks.get(track))
                .map_or_else(|| node.track().unwrap_or_default().to_string(), |track| track.file.clone());
            text.push_str(&escape_label(&label));
        } else {
            text.push('(');
            for (index, &child) in node.children().iter().enumerate() {
                if index > 0 {
                    text.push(',');
                }
                self.render_node(child, tracks, scale, text);
            }
            text.push(')');
            if node.bootstrap() != 0.0 {
                text.push_str(&format_length(node.bootstrap()));
            }
        }
        if node.parent().is_some() {
            text.push(':');
            text.push_str(&format_length(node.distance() * scale));
        }
    }
}
