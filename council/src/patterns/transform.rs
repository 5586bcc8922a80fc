//! Output transforms applied between chain steps.

/// A named output transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Contents of fenced code blocks, joined by a blank line.
    ExtractCode,
    FirstLine,
    Trim,
    Identity,
}

impl Transform {
    /// Parse a transform name. Unknown names are the identity.
    pub fn parse(name: &str) -> Self {
        match name {
            "extract_code" => Self::ExtractCode,
            "first_line" => Self::FirstLine,
            "trim" => Self::Trim,
            _ => Self::Identity,
        }
    }

    pub fn apply(self, output: &str) -> String {
        match self {
            Self::ExtractCode => extract_code_blocks(output),
            Self::FirstLine => output.lines().next().unwrap_or("").to_string(),
            Self::Trim => output.trim().to_string(),
            Self::Identity => output.to_string(),
        }
    }
}

/// Contents of every ```-fenced block in `text`, joined by a blank line.
/// An unterminated trailing block is dropped.
pub fn extract_code_blocks(text: &str) -> String {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        if line.starts_with("```") {
            match current.take() {
                Some(lines) => blocks.push(lines.join("\n")),
                None => current = Some(Vec::new()),
            }
            continue;
        }
        if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }

    blocks.join("\n\n")
}
