//! Supported TeX engines and construction of the compiler invocation.
//!
//! Compilation is always driven through `latexmk`; the engine only selects
//! the PDF production mode. The full command vector is a pure function of
//! (engine, main input, shell-escape policy).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The latexmk driver binary.
pub const DRIVER: &str = "latexmk";

/// A TeX engine profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    XeLaTeX,
    PdfLaTeX,
    LuaLaTeX,
}

/// All engines known to the registry.
pub const SUPPORTED_ENGINES: [Engine; 3] = [Engine::XeLaTeX, Engine::PdfLaTeX, Engine::LuaLaTeX];

/// Error for engine names outside the registry.
#[derive(Debug, Error)]
#[error("unsupported TeX engine: {0:?}")]
pub struct UnsupportedEngine(pub String);

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::XeLaTeX => "xelatex",
            Engine::PdfLaTeX => "pdflatex",
            Engine::LuaLaTeX => "lualatex",
        }
    }

    /// The latexmk flag selecting this engine.
    fn selector_flag(&self) -> &'static str {
        match self {
            Engine::XeLaTeX => "-pdfxe",
            Engine::PdfLaTeX => "-pdf",
            Engine::LuaLaTeX => "-pdflua",
        }
    }

    /// Build the full compiler command vector for the given main input.
    pub fn latexmk_cmd(&self, main_input: &str, shell_escape: ShellEscape) -> Vec<String> {
        let mut cmd: Vec<String> = [DRIVER, "-cd", "-silent", "-pv-", "-pvc-"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(flag) = shell_escape.flag() {
            cmd.push(flag.to_string());
        }
        cmd.push(self.selector_flag().to_string());
        cmd.push(main_input.to_string());
        cmd
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Engine {
    type Err = UnsupportedEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SUPPORTED_ENGINES
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| UnsupportedEngine(s.to_string()))
    }
}

/// Process-wide shell-escape policy for the TeX compiler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellEscape {
    /// latexmk's default: only a small set of vetted commands may run.
    #[default]
    Restricted,
    Allowed,
    Forbidden,
}

impl ShellEscape {
    /// The latexmk flag for this policy; restricted mode passes no flag.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            ShellEscape::Restricted => None,
            ShellEscape::Allowed => Some("-shell-escape"),
            ShellEscape::Forbidden => Some("-no-shell-escape"),
        }
    }
}

impl std::str::FromStr for ShellEscape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restricted" => Ok(ShellEscape::Restricted),
            "allowed" => Ok(ShellEscape::Allowed),
            "forbidden" => Ok(ShellEscape::Forbidden),
            other => Err(format!("unknown shell-escape mode: {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_engines() {
        assert_eq!("xelatex".parse::<Engine>().unwrap(), Engine::XeLaTeX);
        assert_eq!("pdflatex".parse::<Engine>().unwrap(), Engine::PdfLaTeX);
        assert_eq!("lualatex".parse::<Engine>().unwrap(), Engine::LuaLaTeX);
        assert!("tectonic".parse::<Engine>().is_err());
    }

    #[test]
    fn command_vector_restricted() {
        let cmd = Engine::XeLaTeX.latexmk_cmd("input.tex", ShellEscape::Restricted);
        assert_eq!(
            cmd,
            vec!["latexmk", "-cd", "-silent", "-pv-", "-pvc-", "-pdfxe", "input.tex"]
        );
    }

    #[test]
    fn command_vector_shell_escape_modes() {
        let cmd = Engine::PdfLaTeX.latexmk_cmd("a.tex", ShellEscape::Allowed);
        assert!(cmd.contains(&"-shell-escape".to_string()));
        assert_eq!(cmd.last().unwrap(), "a.tex");

        let cmd = Engine::LuaLaTeX.latexmk_cmd("a.tex", ShellEscape::Forbidden);
        assert!(cmd.contains(&"-no-shell-escape".to_string()));
        assert!(cmd.contains(&"-pdflua".to_string()));
    }
}
