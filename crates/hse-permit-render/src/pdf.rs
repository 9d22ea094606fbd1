//! PDF output.
//!
//! One Courier text block per A4 page, one line per layout line. The writer
//! adds no creation date, producer string or document ID, so identical
//! layouts give identical bytes.
//!
//! The canonical content record goes into the document information
//! dictionary as a hex string under `PermitRecord`.

use hse_permit_core::{ApprovalLedger, Permit};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::{RenderError, Result};
use crate::layout::{content_record, DocumentLayout};

/// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;

const MARGIN_LEFT: i64 = 50;
const FIRST_BASELINE: i64 = 800;
const FOOTER_BASELINE: i64 = 30;
const FONT_SIZE: i64 = 9;
const LEADING: i64 = 12;

/// Lines that fit between the first baseline and the footer.
pub const LINES_PER_PAGE: usize = 60;

/// Turns a permit and its ledger into document bytes.
///
/// Implementations must be pure: the same inputs give the same bytes.
pub trait DocumentRenderer: Send + Sync {
    fn render(
        &self,
        permit: &Permit,
        approvals: &ApprovalLedger,
        generated_at: i64,
    ) -> Result<Vec<u8>>;
}

/// Renders the canonical layout to PDF with lopdf.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    signature_display_len: usize,
}

impl PdfRenderer {
    pub fn new(signature_display_len: usize) -> Self {
        Self {
            signature_display_len,
        }
    }

    pub fn layout(
        &self,
        permit: &Permit,
        approvals: &ApprovalLedger,
        generated_at: i64,
    ) -> DocumentLayout {
        DocumentLayout::build(permit, approvals, generated_at, self.signature_display_len)
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new(16)
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(
        &self,
        permit: &Permit,
        approvals: &ApprovalLedger,
        generated_at: i64,
    ) -> Result<Vec<u8>> {
        let layout = self.layout(permit, approvals, generated_at);
        let record = content_record(permit, approvals, generated_at)?;
        let bytes = write_pdf(layout.lines(), &record)?;
        tracing::debug!(
            permit_id = %permit.id,
            lines = layout.lines().len(),
            len = bytes.len(),
            "permit rendered"
        );
        Ok(bytes)
    }
}

fn latin1(line: &str) -> Result<Object> {
    let bytes = line
        .chars()
        .map(|c| {
            u8::try_from(u32::from(c))
                .map_err(|_| RenderError::Encoding(format!("{c:?} is outside Latin-1")))
        })
        .collect::<Result<Vec<u8>>>()?;
    Ok(Object::String(bytes, StringFormat::Literal))
}

fn text_ops(ops: &mut Vec<Operation>, x: i64, y: i64, lines: &[String]) -> Result<()> {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec!["F1".into(), Object::Integer(FONT_SIZE)],
    ));
    ops.push(Operation::new("TL", vec![Object::Integer(LEADING)]));
    ops.push(Operation::new(
        "Td",
        vec![Object::Integer(x), Object::Integer(y)],
    ));
    for line in lines {
        ops.push(Operation::new("Tj", vec![latin1(line)?]));
        ops.push(Operation::new("T*", vec![]));
    }
    ops.push(Operation::new("ET", vec![]));
    Ok(())
}

fn write_pdf(lines: &[String], record: &str) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![lines]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };
    let page_count = chunks.len();

    let mut kids = Vec::with_capacity(page_count);
    for (index, chunk) in chunks.into_iter().enumerate() {
        let mut ops = Vec::new();
        text_ops(&mut ops, MARGIN_LEFT, FIRST_BASELINE, chunk)?;
        let footer = [format!("Page {}/{}", index + 1, page_count)];
        text_ops(&mut ops, MARGIN_LEFT, FOOTER_BASELINE, &footer)?;

        let content = Content { operations: ops }
            .encode()
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(page_count as i64),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "PermitRecord" => Object::String(record.as_bytes().to_vec(), StringFormat::Hexadecimal),
    });
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hse_permit_core::{
        Approval, ApprovalId, Decision, DocumentDigest, FieldMap, PermitDraft, PermitId,
        PermitNumber, PermitTypeId, Role, SignatureDigest, UserId, ZoneId,
    };
    use proptest::prelude::*;

    const NOW: i64 = 1_780_000_000_000;

    fn permit(title: &str) -> Permit {
        Permit::from_draft(
            PermitId::from_bytes([1; 16]),
            PermitNumber::new(2026, 1),
            UserId::from_bytes([2; 16]),
            PermitDraft {
                permit_type_id: PermitTypeId::from_bytes([3; 16]),
                zone_id: ZoneId::from_bytes([4; 16]),
                starts_at: NOW,
                ends_at: NOW + 1,
                title: title.into(),
                description: "(parenthèses) et \\ barre".into(),
                preconditions: FieldMap::new(),
                prevention_measures: FieldMap::new(),
                atmospheric_tests: FieldMap::new(),
                attachments: FieldMap::new(),
            },
            NOW,
        )
    }

    fn ledger(permit: &Permit, count: usize) -> ApprovalLedger {
        ApprovalLedger::new(
            (0..count)
                .map(|i| Approval {
                    id: ApprovalId::from_bytes([i as u8; 16]),
                    permit_id: permit.id,
                    actor_id: UserId::from_bytes([9; 16]),
                    approval_role: Role::Hse,
                    decision: Decision::Approve,
                    comment: Some(format!("visite {i}")),
                    signature_image: None,
                    signature_digest: Some(SignatureDigest::from_bytes([i as u8; 32])),
                    timestamp: NOW + i as i64,
                })
                .collect(),
        )
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = PdfRenderer::default();
        let p = permit("Point chaud");
        let l = ledger(&p, 2);

        let a = renderer.render(&p, &l, NOW + 5).unwrap();
        let b = renderer.render(&p, &l, NOW + 5).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn test_render_parses_back() {
        let renderer = PdfRenderer::default();
        let p = permit("Point chaud");
        let bytes = renderer.render(&p, &ledger(&p, 1), NOW).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_record_is_embedded() {
        let renderer = PdfRenderer::default();
        let p = permit("Point chaud");
        let l = ledger(&p, 1);
        let bytes = renderer.render(&p, &l, NOW).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let info = doc
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .unwrap();
        let embedded = info.get(b"PermitRecord").and_then(Object::as_str).unwrap();
        assert_eq!(embedded, content_record(&p, &l, NOW).unwrap().as_bytes());
    }

    #[test]
    fn test_long_ledger_paginates() {
        let renderer = PdfRenderer::default();
        let p = permit("Consignation");
        let bytes = renderer.render(&p, &ledger(&p, 40), NOW).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let expected = renderer.layout(&p, &ledger(&p, 40), NOW).lines().len();
        assert_eq!(doc.get_pages().len(), expected.div_ceil(LINES_PER_PAGE));
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn test_display_len_changes_output() {
        let p = permit("Fouille");
        let l = ledger(&p, 1);
        let short = PdfRenderer::new(8).render(&p, &l, NOW).unwrap();
        let long = PdfRenderer::new(16).render(&p, &l, NOW).unwrap();
        assert_ne!(DocumentDigest::compute(&short), DocumentDigest::compute(&long));
    }

    proptest! {
        #[test]
        fn prop_title_change_changes_digest(a in ".{1,40}", b in ".{1,40}") {
            prop_assume!(a != b);
            let renderer = PdfRenderer::default();
            let pa = permit(&a);
            let pb = permit(&b);
            let da = DocumentDigest::compute(&renderer.render(&pa, &ApprovalLedger::default(), NOW).unwrap());
            let db = DocumentDigest::compute(&renderer.render(&pb, &ApprovalLedger::default(), NOW).unwrap());
            prop_assert_ne!(da, db);
        }
    }
}
