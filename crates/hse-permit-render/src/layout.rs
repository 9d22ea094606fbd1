//! Canonical text layout of a permit document.
//!
//! The layout is a flat list of lines in a fixed order. Everything that ends
//! up in the PDF goes through here, so two permits with the same content,
//! ledger and `generated_at` always produce the same lines.
//!
//! Free text is escaped reversibly: a backslash becomes `\\` and anything
//! the single-byte PDF font cannot show becomes `\u{hex}`. Map keys and
//! values are printed as quoted JSON.
//!
//! Not part of the layout: `revision`, `updated_at`, `deleted` and the
//! document record itself.

use chrono::{TimeZone, Utc};
use std::fmt::Write as _;

use hse_permit_core::{canonical_json, Approval, ApprovalLedger, FieldMap, Permit};
use serde_json::Value;

use crate::error::{RenderError, Result};

/// Maximum characters per line. Courier at 9pt fits this on A4 with margins.
pub const LINE_WIDTH: usize = 90;

const INDENT: &str = "    ";

/// The ordered lines of a rendered permit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLayout {
    lines: Vec<String>,
}

impl DocumentLayout {
    /// Lay out `permit` and its ledger. `signature_display_len` is how many
    /// hex characters of each signature digest are printed.
    pub fn build(
        permit: &Permit,
        approvals: &ApprovalLedger,
        generated_at: i64,
        signature_display_len: usize,
    ) -> Self {
        let mut out = LayoutWriter::default();

        out.line(format!("PERMIS DE TRAVAIL {}", permit.number));
        out.blank();
        out.field("Titre", &permit.title);
        out.field("Statut", permit.status.as_str());
        out.field("Type de permis", &permit.permit_type_id.to_string());
        out.field("Zone", &permit.zone_id.to_string());
        out.field("Debut", &format_timestamp(permit.starts_at));
        out.field("Fin", &format_timestamp(permit.ends_at));
        out.field("Demandeur", &permit.requester_id.to_string());
        out.field("Cree le", &format_timestamp(permit.created_at));
        out.field("Genere le", &format_timestamp(generated_at));

        out.blank();
        out.heading("DESCRIPTION");
        if permit.description.is_empty() {
            out.lines.push("(aucune)".to_string());
        } else {
            for paragraph in permit.description.split('\n') {
                out.wrapped(INDENT, paragraph);
            }
        }

        out.blank();
        out.heading("CONDITIONS PREALABLES");
        out.map(&permit.preconditions);
        out.blank();
        out.heading("MESURES DE PREVENTION");
        out.map(&permit.prevention_measures);
        out.blank();
        out.heading("TESTS ATMOSPHERIQUES");
        out.map(&permit.atmospheric_tests);
        out.blank();
        out.heading("PIECES JOINTES");
        out.map(&permit.attachments);

        out.blank();
        out.heading("VALIDATIONS");
        if approvals.is_empty() {
            out.lines.push("(aucune)".to_string());
        }
        for (index, approval) in approvals.iter().enumerate() {
            out.approval(index + 1, approval, signature_display_len);
        }

        Self { lines: out.lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[derive(Default)]
struct LayoutWriter {
    lines: Vec<String>,
}

impl LayoutWriter {
    fn line(&mut self, text: String) {
        self.wrapped("", &text);
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn heading(&mut self, title: &str) {
        self.lines.push(title.to_string());
        self.lines.push("-".repeat(title.len()));
    }

    fn field(&mut self, label: &str, value: &str) {
        self.wrapped("", &format!("{label} : {value}"));
    }

    fn map(&mut self, map: &FieldMap) {
        if map.is_empty() {
            self.lines.push("(aucun)".to_string());
            return;
        }
        for (key, value) in map {
            let key = canonical_json(&Value::String(key.clone()));
            self.wrapped(INDENT, &format!("{key} : {}", canonical_json(value)));
        }
    }

    fn approval(&mut self, index: usize, approval: &Approval, display_len: usize) {
        self.wrapped(
            "",
            &format!(
                "{index}. {} {} par {}",
                approval.approval_role,
                approval.decision.as_str(),
                approval.actor_id
            ),
        );
        self.wrapped(INDENT, &format!("le {}", format_timestamp(approval.timestamp)));
        if let Some(comment) = &approval.comment {
            self.wrapped(INDENT, &format!("commentaire : {comment}"));
        }
        if let Some(image) = &approval.signature_image {
            self.wrapped(INDENT, &format!("visa : {image}"));
        }
        let digest = approval
            .signature_digest
            .map(|d| d.short(display_len))
            .unwrap_or_else(|| "absente".to_string());
        self.wrapped(INDENT, &format!("empreinte : {digest}"));
    }

    /// Escape, then wrap at word boundaries. Continuation lines get one
    /// extra indent.
    fn wrapped(&mut self, indent: &str, text: &str) {
        let text = escape_text(text);
        let first_width = LINE_WIDTH.saturating_sub(indent.len()).max(1);
        let cont_indent = format!("{indent}{INDENT}");
        let cont_width = LINE_WIDTH.saturating_sub(cont_indent.len()).max(1);

        let chunks = wrap(&text, first_width, cont_width);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let prefix = if i == 0 { indent } else { cont_indent.as_str() };
            self.lines.push(format!("{prefix}{chunk}"));
        }
    }
}

/// Make `text` printable in a single-byte font without losing information.
///
/// `\\` stands for a backslash; control characters and anything outside
/// Latin-1 become `\u{hex}`. Distinct inputs give distinct outputs.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' {
            out.push_str("\\\\");
        } else if c.is_control() || u32::from(c) > 0xFF {
            let _ = write!(out, "\\u{{{:x}}}", u32::from(c));
        } else {
            out.push(c);
        }
    }
    out
}

fn wrap(text: &str, first_width: usize, cont_width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut placed = false;

    // Splitting on single spaces keeps runs of spaces as empty words, so
    // leading and inner whitespace survive.
    for word in text.split(' ') {
        let mut word: Vec<char> = word.chars().collect();

        loop {
            let width = if out.is_empty() { first_width } else { cont_width };
            let needed = if placed { current_len + 1 + word.len() } else { word.len() };
            if needed <= width {
                if placed {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(word.iter());
                current_len += word.len();
                placed = true;
                break;
            }
            if placed {
                out.push(std::mem::take(&mut current));
                current_len = 0;
                placed = false;
                continue;
            }
            // A single word longer than the line is hard-split.
            let rest = word.split_off(width);
            out.push(word.into_iter().collect());
            word = rest;
        }
    }

    if placed || out.is_empty() {
        out.push(current);
    }
    out
}

/// Canonical JSON of everything the layout shows, embedded in the PDF.
///
/// Wrapping can make two texts look alike on the page; this record cannot.
/// Bookkeeping fields are dropped exactly as in [`DocumentLayout::build`].
pub fn content_record(
    permit: &Permit,
    approvals: &ApprovalLedger,
    generated_at: i64,
) -> Result<String> {
    let mut permit = serde_json::to_value(permit).map_err(encoding)?;
    if let Value::Object(fields) = &mut permit {
        for key in ["revision", "updated_at", "deleted", "document"] {
            fields.remove(key);
        }
    }
    let approvals = serde_json::to_value(approvals.as_slice()).map_err(encoding)?;

    let mut record = serde_json::Map::new();
    record.insert("approvals".into(), approvals);
    record.insert("generated_at".into(), Value::from(generated_at));
    record.insert("permit".into(), permit);
    Ok(canonical_json(&Value::Object(record)))
}

fn encoding(e: serde_json::Error) -> RenderError {
    RenderError::Encoding(e.to_string())
}

/// `YYYY-MM-DD HH:MM:SS UTC`, or the raw milliseconds if out of range.
pub fn format_timestamp(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{ms} ms"))
}
