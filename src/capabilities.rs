use tracing::{info, warn};

const BASE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Optional decoders available to this process, probed once at startup and
/// handed to the loader and to every catalog that filters by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub heif: bool,
}

impl Capabilities {
    pub fn probe() -> Self {
        let caps = Self {
            heif: cfg!(feature = "heif"),
        };
        if caps.heif {
            info!("HEIC/HEIF decoding available");
        } else {
            warn!("HEIC/HEIF decoder not built in; those files will be ignored");
        }
        caps
    }

    /// Capabilities with every optional decoder disabled.
    pub const fn baseline() -> Self {
        Self { heif: false }
    }

    pub fn supports_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        BASE_EXTENSIONS.contains(&ext.as_str())
            || (self.heif && HEIF_EXTENSIONS.contains(&ext.as_str()))
    }

    pub fn is_heif_extension(ext: &str) -> bool {
        HEIF_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    }
}
