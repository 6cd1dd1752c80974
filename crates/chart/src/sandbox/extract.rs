//! Fenced code block extraction from model output.

use ragchart_core::{AppError, AppResult};
use regex::Regex;

/// A tag may share its line with the body: ```` ```python x = 1``` ````.
const FENCE_PATTERN: &str = r"(?s)```(?:(\w+)[ \t]*\n?|[ \t]*\n)(.*?)```";
const PYTHON_TAGS: [&str; 4] = ["", "python", "python3", "py"];

/// Body of the first ```python, ```py or bare fenced block, trimmed.
///
/// Blocks tagged with another language are skipped. Returns `None` when no
/// such block exists or it is blank.
pub fn extract_code(text: &str) -> AppResult<Option<String>> {
    first_block(text, &PYTHON_TAGS)
}

/// Body of the first non-blank fenced block whose tag is in `tags`.
pub fn first_block(text: &str, tags: &[&str]) -> AppResult<Option<String>> {
    let fence = Regex::new(FENCE_PATTERN).map_err(|e| AppError::Sandbox(e.to_string()))?;

    let body = fence
        .captures_iter(text)
        .filter(|c| {
            let tag = c.get(1).map_or("", |m| m.as_str().trim());
            tags.contains(&tag.to_lowercase().as_str())
        })
        .filter_map(|c| c.get(2))
        .map(|m| m.as_str().trim())
        .find(|body| !body.is_empty())
        .map(str::to_string);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_block() {
        let text = "Here you go:\n```python\nlabels = ['A']\nvalues = [1]\nplt.bar(labels, values)\n```\nEnjoy.";
        assert_eq!(
            extract_code(text).unwrap().unwrap(),
            "labels = ['A']\nvalues = [1]\nplt.bar(labels, values)"
        );
    }

    #[test]
    fn test_bare_and_py_fences() {
        assert_eq!(extract_code("```\nx = 1\n```").unwrap().unwrap(), "x = 1");
        assert_eq!(extract_code("```py\nx = 2\n```").unwrap().unwrap(), "x = 2");
    }

    #[test]
    fn test_one_line_fence() {
        assert_eq!(extract_code("```python x = 1```").unwrap().unwrap(), "x = 1");
        assert_eq!(
            extract_code("Chart: ```python plt.bar(['a'], [1])``` done").unwrap().unwrap(),
            "plt.bar(['a'], [1])"
        );
        assert_eq!(extract_code("```sql SELECT 1```").unwrap(), None);
    }

    #[test]
    fn test_first_block_wins() {
        let text = "```python\nfirst = 1\n```\n```python\nsecond = 2\n```";
        assert_eq!(extract_code(text).unwrap().unwrap(), "first = 1");
    }

    #[test]
    fn test_other_languages_skipped() {
        let text = "```sql\nSELECT 1\n```\n```python\nx = 1\n```";
        assert_eq!(extract_code(text).unwrap().unwrap(), "x = 1");
    }

    #[test]
    fn test_no_block() {
        assert_eq!(extract_code("No meaningful numeric relationship detected.").unwrap(), None);
        assert_eq!(extract_code("```python\n\n```").unwrap(), None);
    }
}
