use crate::workflows::fraud::UserId;

/// Side of the identity document a picture shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFace {
    Front,
    Back,
}

impl DocumentFace {
    pub fn label(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

/// `{user}-{identification}-{face}{.ext}`, the extension guessed from the picture mime type.
pub fn picture_file_name(
    user_id: UserId,
    identification_id: &str,
    face: DocumentFace,
    content_type: Option<&str>,
) -> String {
    let extension = content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .and_then(extension_for)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    format!("{user_id}-{identification_id}-{}{extension}", face.label())
}

fn extension_for(mime_type: &str) -> Option<&'static str> {
    let candidates = mime_guess::get_mime_extensions_str(mime_type)?;
    // jpeg maps to several extensions; keep the usual one.
    candidates
        .iter()
        .copied()
        .find(|ext| *ext == "jpg")
        .or_else(|| candidates.first().copied())
}
