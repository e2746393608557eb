use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;

use crate::{
    error::{ReelError, ReelResult},
    text::{BuiltinFace, OutlineFace, Typeface},
};

/// One entry of a font fallback chain.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontCandidate {
    /// A TrueType/OpenType file on disk.
    Path(PathBuf),
    /// Font bytes already in memory.
    #[serde(skip)]
    Bytes(Arc<Vec<u8>>),
    /// The host's sans-serif family, discovered through the system font database.
    SystemSansSerif,
    /// The block face compiled into the crate. Never fails.
    Builtin,
}

/// Bold sans faces at their usual locations on Windows, Linux and macOS, then the system
/// database, then the builtin face.
pub fn default_font_candidates() -> Vec<FontCandidate> {
    vec![
        FontCandidate::Path(PathBuf::from("C:\\Windows\\Fonts\\arial.ttf")),
        FontCandidate::Path(PathBuf::from(
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        )),
        FontCandidate::Path(PathBuf::from("/Library/Fonts/Arial.ttf")),
        FontCandidate::SystemSansSerif,
        FontCandidate::Builtin,
    ]
}

/// Ordered font fallback chain resolved with a first-success policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontSource {
    candidates: Vec<FontCandidate>,
}

impl Default for FontSource {
    fn default() -> Self {
        Self::new(default_font_candidates())
    }
}

impl FontSource {
    pub fn new(candidates: Vec<FontCandidate>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[FontCandidate] {
        &self.candidates
    }

    /// Try each candidate in order and return the first that loads.
    ///
    /// Failed candidates are logged and skipped. Only an exhausted chain is an error.
    pub fn resolve(&self) -> ReelResult<Arc<dyn Typeface>> {
        for candidate in &self.candidates {
            match load_candidate(candidate) {
                Ok(face) => {
                    tracing::debug!(face = face.name(), ?candidate, "font resolved");
                    return Ok(face);
                }
                Err(err) => {
                    tracing::warn!(?candidate, error = %err, "font candidate unavailable");
                }
            }
        }
        Err(ReelError::resource(
            "no font candidate in the fallback chain could be loaded",
        ))
    }
}

fn load_candidate(candidate: &FontCandidate) -> ReelResult<Arc<dyn Typeface>> {
    match candidate {
        FontCandidate::Path(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read font file '{}'", path.display()))
                .map_err(|e| ReelError::resource(format!("{e:#}")))?;
            Ok(Arc::new(OutlineFace::from_bytes(Arc::new(bytes), 0)?))
        }
        FontCandidate::Bytes(bytes) => Ok(Arc::new(OutlineFace::from_bytes(bytes.clone(), 0)?)),
        FontCandidate::SystemSansSerif => {
            let (bytes, index) = load_system_sans_serif()?;
            Ok(Arc::new(OutlineFace::from_bytes(Arc::new(bytes), index)?))
        }
        FontCandidate::Builtin => Ok(Arc::new(BuiltinFace)),
    }
}

fn load_system_sans_serif() -> ReelResult<(Vec<u8>, u32)> {
    use usvg::fontdb;

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let bold = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        weight: fontdb::Weight::BOLD,
        ..Default::default()
    };
    let regular = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };

    let id = db
        .query(&bold)
        .or_else(|| db.query(&regular))
        .or_else(|| db.faces().next().map(|f| f.id))
        .ok_or_else(|| ReelError::resource("system font database is empty"))?;

    db.with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| ReelError::resource("system font face data could not be read"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_paths_fall_through_to_builtin() {
        let source = FontSource::new(vec![
            FontCandidate::Path(PathBuf::from("/definitely/not/here.ttf")),
            FontCandidate::Bytes(Arc::new(b"not a font".to_vec())),
            FontCandidate::Builtin,
        ]);
        let face = source.resolve().unwrap();
        assert_eq!(face.name(), "builtin-block");
    }

    #[test]
    fn exhausted_chain_is_resource_unavailable() {
        let source = FontSource::new(vec![FontCandidate::Path(PathBuf::from(
            "/definitely/not/here.ttf",
        ))]);
        let err = source.resolve().unwrap_err();
        assert!(matches!(err, ReelError::ResourceUnavailable(_)));
    }

    #[test]
    fn default_chain_ends_with_builtin() {
        let c = default_font_candidates();
        assert_eq!(c.last(), Some(&FontCandidate::Builtin));
        assert!(FontSource::default().resolve().is_ok());
    }

    #[test]
    fn candidates_deserialize_from_config_json() {
        let c: Vec<FontCandidate> =
            serde_json::from_str(r#"[{"path": "/tmp/a.ttf"}, "system_sans_serif", "builtin"]"#)
                .unwrap();
        assert_eq!(
            c,
            vec![
                FontCandidate::Path(PathBuf::from("/tmp/a.ttf")),
                FontCandidate::SystemSansSerif,
                FontCandidate::Builtin,
            ]
        );
    }
}
