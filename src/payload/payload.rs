use std::fmt;

use crate::payload::StepResult;

/// The unit of data flowing between pipeline steps.
///
/// Payloads are immutable once handed to a processor: executors build fresh
/// payloads when propagating, and processors construct children on fan-out.
/// `job_id` and `document_id` are stable for the whole run;
/// `parent_document_id` and `page_number` carry lineage for payloads produced
/// by fan-out.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    pub job_id: String,
    pub file_name: String,
    pub file_content: Vec<u8>,
    /// Identifier of the root document (md5 of the original file bytes).
    pub document_id: String,
    pub parent_document_id: Option<String>,
    pub page_number: Option<u32>,
    /// Append-only history of prior step results on this payload's lineage.
    pub results: Vec<StepResult>,
}

impl DocumentPayload {
    /// Root payload for a fresh run: no lineage, empty history.
    pub fn root(
        job_id: impl Into<String>,
        file_name: impl Into<String>,
        file_content: Vec<u8>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            file_content,
            document_id: document_id.into(),
            parent_document_id: None,
            page_number: None,
            results: Vec::new(),
        }
    }

    /// Successor payload on 1:1 propagation: same lineage, replaced bytes,
    /// history extended with the step result that produced it.
    pub fn propagate(&self, file_content: Vec<u8>, result: StepResult) -> Self {
        let mut results = self.results.clone();
        results.push(result);
        Self {
            job_id: self.job_id.clone(),
            file_name: self.file_name.clone(),
            file_content,
            document_id: self.document_id.clone(),
            parent_document_id: self.parent_document_id.clone(),
            page_number: self.page_number,
            results,
        }
    }
}

/// Ordering key for payloads inside one linear step.
///
/// Keys are ordered (root, then pages ascending, then synthetic keys in
/// creation order) so that launch order within a step is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PayloadKey {
    Root,
    Page(u32),
    Synthetic(u32),
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKey::Root => write!(f, "root"),
            PayloadKey::Page(n) => write!(f, "page_{}", n),
            PayloadKey::Synthetic(n) => write!(f, "anon_{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_keys_order_root_then_pages_then_synthetic() {
        let mut keys = vec![
            PayloadKey::Synthetic(0),
            PayloadKey::Page(3),
            PayloadKey::Root,
            PayloadKey::Page(1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PayloadKey::Root,
                PayloadKey::Page(1),
                PayloadKey::Page(3),
                PayloadKey::Synthetic(0),
            ]
        );
    }

    #[test]
    fn propagate_preserves_lineage_and_appends_history() {
        let mut root = DocumentPayload::root("job-1", "scan.png", vec![1, 2, 3], "d41d8cd9");
        root.parent_document_id = Some("parent".into());
        root.page_number = Some(4);

        let result = StepResult::success("image_preprocessor");
        let next = root.propagate(vec![9, 9], result);

        assert_eq!(next.job_id, "job-1");
        assert_eq!(next.document_id, "d41d8cd9");
        assert_eq!(next.parent_document_id.as_deref(), Some("parent"));
        assert_eq!(next.page_number, Some(4));
        assert_eq!(next.file_content, vec![9, 9]);
        assert_eq!(next.results.len(), 1);
        assert!(root.results.is_empty());
    }
}
