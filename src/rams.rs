//! RAMS document rules: accepted uploads, assignment planning and signature checks.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;
use uuid::Uuid;

use crate::lifecycle::AssignmentStatus;

pub const SIGNATURE_PREFIX: &str = "data:image/png;base64,";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const MAX_SIGNATURE_BYTES: usize = 512 * 1024;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamsFileType {
    Pdf,
    Docx,
}

impl RamsFileType {
    pub fn as_str(self) -> &'static str {
        match self {
            RamsFileType::Pdf => "pdf",
            RamsFileType::Docx => "docx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            RamsFileType::Pdf => PDF_MIME,
            RamsFileType::Docx => DOCX_MIME,
        }
    }

    /// Decides by extension first, then by the declared content type.
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("pdf") => return Some(RamsFileType::Pdf),
            Some("docx") => return Some(RamsFileType::Docx),
            Some(_) => return None,
            None => {}
        }
        match content_type {
            Some(PDF_MIME) => Some(RamsFileType::Pdf),
            Some(DOCX_MIME) => Some(RamsFileType::Docx),
            _ => None,
        }
    }
}

/// Keeps only the final path component and replaces characters that do not
/// belong in an object key.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

pub fn object_key(document_id: Uuid, file_name: &str) -> String {
    format!("rams/{document_id}/{file_name}")
}

pub fn inline_content_disposition(file_name: &str) -> Option<String> {
    if file_name.is_empty() {
        return None;
    }
    let encoded =
        percent_encoding::utf8_percent_encode(file_name, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        file_name, encoded
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssignmentPlan {
    pub to_add: Vec<Uuid>,
    pub to_remove: Vec<Uuid>,
    pub preserved: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("cannot unassign employees who have already signed ({} affected)", .0.len())]
    SignedEmployeesRemoved(Vec<Uuid>),
}

/// Reconciles the requested employee list with existing assignments.
/// Existing assignments keep their status; removing a signed one is refused.
pub fn plan_assignments(
    current: &[(Uuid, AssignmentStatus)],
    requested: &[Uuid],
) -> Result<AssignmentPlan, AssignmentError> {
    let existing: HashMap<Uuid, AssignmentStatus> = current.iter().copied().collect();
    let mut seen = HashSet::new();
    let requested: Vec<Uuid> = requested
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    let signed_removals: Vec<Uuid> = current
        .iter()
        .filter(|(id, status)| *status == AssignmentStatus::Signed && !seen.contains(id))
        .map(|(id, _)| *id)
        .collect();
    if !signed_removals.is_empty() {
        return Err(AssignmentError::SignedEmployeesRemoved(signed_removals));
    }

    let mut plan = AssignmentPlan::default();
    for id in requested {
        if existing.contains_key(&id) {
            plan.preserved.push(id);
        } else {
            plan.to_add.push(id);
        }
    }
    plan.to_remove = current
        .iter()
        .filter(|(id, _)| !seen.contains(id))
        .map(|(id, _)| *id)
        .collect();
    Ok(plan)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature must be a PNG data URL")]
    NotPngDataUrl,
    #[error("signature payload is not valid base64")]
    InvalidEncoding,
    #[error("signature image is empty or not a PNG")]
    NotPng,
    #[error("signature image is too large")]
    TooLarge,
}

pub fn validate_signature(data: &str) -> Result<(), SignatureError> {
    let payload = data
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::NotPngDataUrl)?;
    if payload.len() > MAX_SIGNATURE_BYTES * 4 / 3 + 4 {
        return Err(SignatureError::TooLarge);
    }
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|_| SignatureError::InvalidEncoding)?;
    if !bytes.starts_with(PNG_MAGIC) {
        return Err(SignatureError::NotPng);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_data_url() -> String {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(b"rest-of-image");
        format!("{SIGNATURE_PREFIX}{}", BASE64.encode(bytes))
    }

    #[test]
    fn detects_supported_types() {
        assert_eq!(RamsFileType::detect("Method.PDF", None), Some(RamsFileType::Pdf));
        assert_eq!(RamsFileType::detect("plan.docx", None), Some(RamsFileType::Docx));
        assert_eq!(RamsFileType::detect("upload", Some(PDF_MIME)), Some(RamsFileType::Pdf));
        assert_eq!(RamsFileType::detect("sheet.xlsx", Some(PDF_MIME)), None);
        assert_eq!(RamsFileType::detect("notes.txt", None), None);
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_file_name("C:\\temp\\Site RAMS (v2).pdf"), "Site_RAMS__v2_.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(".."), "document");
    }

    #[test]
    fn builds_object_key() {
        let id = Uuid::nil();
        assert_eq!(
            object_key(id, "plan.pdf"),
            "rams/00000000-0000-0000-0000-000000000000/plan.pdf"
        );
    }

    #[test]
    fn new_assignments_and_preserved_statuses() {
        let read = Uuid::new_v4();
        let pending = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let plan = plan_assignments(
            &[(read, AssignmentStatus::Read), (pending, AssignmentStatus::Pending)],
            &[read, fresh, fresh],
        )
        .unwrap();
        assert_eq!(plan.to_add, vec![fresh]);
        assert_eq!(plan.preserved, vec![read]);
        assert_eq!(plan.to_remove, vec![pending]);
    }

    #[test]
    fn removing_signed_employee_is_refused() {
        let signed = Uuid::new_v4();
        let other = Uuid::new_v4();
        let err = plan_assignments(&[(signed, AssignmentStatus::Signed)], &[other]).unwrap_err();
        assert_eq!(err, AssignmentError::SignedEmployeesRemoved(vec![signed]));
    }

    #[test]
    fn keeping_signed_employee_is_fine() {
        let signed = Uuid::new_v4();
        let plan = plan_assignments(&[(signed, AssignmentStatus::Signed)], &[signed]).unwrap();
        assert_eq!(plan.preserved, vec![signed]);
        assert!(plan.to_add.is_empty() && plan.to_remove.is_empty());
    }

    #[test]
    fn signature_validation() {
        assert!(validate_signature(&png_data_url()).is_ok());
        assert_eq!(
            validate_signature("data:image/jpeg;base64,AAAA"),
            Err(SignatureError::NotPngDataUrl)
        );
        assert_eq!(
            validate_signature("data:image/png;base64,@@@"),
            Err(SignatureError::InvalidEncoding)
        );
        assert_eq!(
            validate_signature(&format!("{SIGNATURE_PREFIX}{}", BASE64.encode(b"GIF89a"))),
            Err(SignatureError::NotPng)
        );
    }
}
