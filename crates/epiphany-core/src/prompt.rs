//! Prompt enhancement

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const STYLE_SUFFIX: &str = "cinematic, high detail";
pub const DEFAULT_PROMPT: &str = "a detailed high-quality image, cinematic, high detail";

static STYLE_WORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(photoreal|cinematic|illustration|anime|watercolor|noir)\b").ok()
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedPrompt {
    pub prompt_enhanced: String,
    pub seed_phrases: Vec<String>,
}

fn names_style(prompt: &str) -> bool {
    STYLE_WORDS
        .as_ref()
        .map(|re| re.is_match(prompt))
        .unwrap_or(false)
}

/// Appends a default style unless the prompt already names one
pub fn enhance(prompt: &str) -> EnhancedPrompt {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return EnhancedPrompt {
            prompt_enhanced: DEFAULT_PROMPT.to_string(),
            seed_phrases: vec![],
        };
    }

    let enhanced = if names_style(trimmed) {
        trimmed.to_string()
    } else {
        format!("{}, {}", trimmed, STYLE_SUFFIX)
    };
    let seed = trimmed.split(',').next().unwrap_or(trimmed).trim();
    let seed_phrases = if seed.is_empty() {
        vec![]
    } else {
        vec![seed.to_string()]
    };

    EnhancedPrompt {
        prompt_enhanced: enhanced,
        seed_phrases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_style_when_missing() {
        let out = enhance("a cat on a roof, at dusk");
        assert_eq!(out.prompt_enhanced, "a cat on a roof, at dusk, cinematic, high detail");
        assert_eq!(out.seed_phrases, vec!["a cat on a roof".to_string()]);
    }

    #[test]
    fn test_keeps_prompt_that_names_a_style() {
        let out = enhance("Watercolor harbor");
        assert_eq!(out.prompt_enhanced, "Watercolor harbor");
    }

    #[test]
    fn test_style_word_must_be_whole_word() {
        let out = enhance("animated dog");
        assert!(out.prompt_enhanced.ends_with(STYLE_SUFFIX));
    }

    #[test]
    fn test_empty_prompt_uses_default() {
        let out = enhance("   ");
        assert_eq!(out.prompt_enhanced, DEFAULT_PROMPT);
        assert!(out.seed_phrases.is_empty());
    }
}
