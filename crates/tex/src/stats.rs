//! Input and output size statistics for a document, grouped into coarse
//! file categories for the metrics layer.

use crate::document::Document;

/// Coarse file categories, keyed off the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileCategory {
    Tex,
    Asset,
    Data,
    Other,
}

impl FileCategory {
    /// Categorise a (cleaned) file name.
    pub fn from_name(name: &str) -> Self {
        let base = name.rsplit('/').next().unwrap_or(name);
        let ext = match base.rfind('.') {
            // no dot, dotfile, or dot at the end of the name
            Some(0) | None => return FileCategory::Other,
            Some(pos) if pos + 1 == base.len() => return FileCategory::Other,
            Some(pos) => &base[pos + 1..],
        };

        match ext {
            "tex" | "sty" | "cls" | "bib" | "bbl" | "lco" => FileCategory::Tex,
            // bitmap and vector images, fonts
            "png" | "jpg" | "jpeg" | "gif" | "pdf" | "eps" | "svg" | "ttf" | "otf" | "mf"
            | "pfm" | "pfb" => FileCategory::Asset,
            "csv" | "xml" | "json" => FileCategory::Data,
            _ => FileCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Tex => "tex",
            FileCategory::Asset => "asset",
            FileCategory::Data => "data",
            FileCategory::Other => "other",
        }
    }
}

/// Per-category input file sizes plus the result size, one entry per file.
#[derive(Debug, Default)]
pub struct InputStats {
    pub tex: Vec<u64>,
    pub assets: Vec<u64>,
    pub data: Vec<u64>,
    pub other: Vec<u64>,
    /// Size of the compiled PDF; `None` when no PDF was produced.
    pub result: Option<u64>,
}

impl InputStats {
    /// Collect statistics for a document after a render attempt.
    pub async fn collect(doc: &Document) -> Self {
        let mut stats = Self::default();
        for (name, size) in doc.file_sizes() {
            match FileCategory::from_name(name) {
                FileCategory::Tex => stats.tex.push(size),
                FileCategory::Asset => stats.assets.push(size),
                FileCategory::Data => stats.data.push(size),
                FileCategory::Other => stats.other.push(size),
            }
        }
        stats.result = doc.result_size().await;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorises_by_extension() {
        assert_eq!(FileCategory::from_name("a.tex"), FileCategory::Tex);
        assert_eq!(FileCategory::from_name("refs.bib"), FileCategory::Tex);
        assert_eq!(FileCategory::from_name("logo.png"), FileCategory::Asset);
        assert_eq!(FileCategory::from_name("font.otf"), FileCategory::Asset);
        assert_eq!(FileCategory::from_name("figure.pdf"), FileCategory::Asset);
        assert_eq!(FileCategory::from_name("table.csv"), FileCategory::Data);
        assert_eq!(FileCategory::from_name("chapters/a.tex"), FileCategory::Tex);
    }

    #[test]
    fn odd_names_are_other() {
        assert_eq!(FileCategory::from_name("Makefile"), FileCategory::Other);
        assert_eq!(FileCategory::from_name(".gitignore"), FileCategory::Other);
        assert_eq!(FileCategory::from_name("trailing."), FileCategory::Other);
        assert_eq!(FileCategory::from_name("unknown.xyz"), FileCategory::Other);
    }
}
