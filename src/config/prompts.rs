//! Prompt templates for Factify.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.
//! Each file (`extraction.toml`, `classification.toml`, `credibility.toml`,
//! `topics.toml`) holds a `system` and a `user` template.

use super::Settings;
use crate::llm::ChatMessage;
use crate::models::{BeliefSystemModule, ExtractedItem};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub extraction: PromptTemplate,
    pub classification: PromptTemplate,
    pub credibility: PromptTemplate,
    pub topics: PromptTemplate,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            extraction: PromptTemplate::extraction(),
            classification: PromptTemplate::classification(),
            credibility: PromptTemplate::credibility(),
            topics: PromptTemplate::topics(),
            variables: HashMap::new(),
        }
    }
}

/// A system/user template pair with `{{variable}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    /// Per-segment item extraction.
    pub fn extraction() -> Self {
        Self {
            system: r#"You are a precise fact-extraction engine. Extract structured items from a YouTube transcript segment.

Item types:
- direct_quote: verbatim words of a speaker; `content` must be an exact substring of the transcript
- transcript_fact: a factual claim stated in the transcript
- general_knowledge: a widely accepted fact the speaker references
- speaker_opinion: a subjective view held by the speaker
- unverified_claim: a claim presented as fact that is hard to verify
- prediction: a statement about future events

Every item must be anchored: `transcript_evidence.text` is an exact substring of the segment, and its start_ms/end_ms fall inside the segment's time range.

Respond with a JSON array only, each element shaped as:
{"id": "<unique id>", "type": "<item type>", "content": "<text>", "speaker": "<name or null>", "transcript_evidence": {"text": "<exact substring>", "start_ms": <int>, "end_ms": <int>}}{{categories_section}}{{belief_systems_section}}"#
                .to_string(),
            user: r#"Video ID: {{video_id}}
Segment time range: {{start_ms}}ms - {{end_ms}}ms

Transcript:
{{transcript}}"#
                .to_string(),
        }
    }

    /// Video category and bias profile.
    pub fn classification() -> Self {
        Self {
            system: r#"You are a video content classifier. Given a transcript or a representative excerpt, determine the video's categories and any bias or slant.

Allowed categories:
{{categories}}

Respond with a JSON object only:
{"categories": ["<category>"], "bias_profile": {"primary_label": "<e.g. neutral, left-leaning, promotional>", "confidence": <0.0-1.0>, "rationale": "<short explanation>", "implicit_bias_notes": ["<note>"]}}"#
                .to_string(),
            user: r#"Video ID: {{video_id}}

Transcript:
{{transcript}}"#
                .to_string(),
        }
    }

    /// Credibility of already-validated items.
    pub fn credibility() -> Self {
        Self {
            system: r#"You assess the credibility of claims extracted from video transcripts.

Labels: well_established, credible, disputed, dubious, unassessable.

Respond with a JSON array only, one element per item:
{"item_id": "<id>", "label": "<label>", "confidence": <0.0-1.0>, "rationale": "<short explanation>", "relevant_belief_systems": ["<module label>"]}{{belief_systems_section}}"#
                .to_string(),
            user: r#"Assess the credibility of these extracted items:

{{items}}"#
                .to_string(),
        }
    }

    /// Topic thread clustering.
    pub fn topics() -> Self {
        Self {
            system: r#"You group extracted transcript items into topic threads. A thread is a subject that recurs across the video. An item may belong to several threads.

Respond with a JSON array only:
[{"label": "<snake_case_label>", "display_name": "<Title>", "summary": "<one sentence>", "item_ids": ["<item id>"]}]"#
                .to_string(),
            user: r#"Cluster these {{item_count}} extracted items into topic threads:

{{items}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = Settings::expand_path(dir);

            let slots: [(&str, &mut PromptTemplate); 4] = [
                ("extraction.toml", &mut prompts.extraction),
                ("classification.toml", &mut prompts.classification),
                ("credibility.toml", &mut prompts.credibility),
                ("topics.toml", &mut prompts.topics),
            ];
            for (file, slot) in slots {
                let path = custom_path.join(file);
                if path.exists() {
                    let content = std::fs::read_to_string(&path)?;
                    *slot = toml::from_str(&content)?;
                }
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Single pass over the template: inserted values are never scanned for
    /// placeholders. Unknown placeholders are left as written.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            result.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let found = after
                .find("}}")
                .and_then(|close| vars.get(&after[..close]).map(|value| (close, value)));

            match found {
                Some((close, value)) => {
                    result.push_str(value);
                    rest = &after[close + 2..];
                }
                None => {
                    result.push('{');
                    rest = &rest[open + 1..];
                }
            }
        }

        result.push_str(rest);
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }

    /// Render both halves of a template into chat messages.
    pub fn messages(&self, template: &PromptTemplate, vars: &HashMap<String, String>) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.render_with_custom(&template.system, vars)),
            ChatMessage::user(self.render_with_custom(&template.user, vars)),
        ]
    }

    /// SHA-256 over every template, for the audit trail.
    pub fn templates_hash(&self) -> String {
        let combined = [
            &self.extraction,
            &self.classification,
            &self.credibility,
            &self.topics,
        ]
        .iter()
        .flat_map(|t| [t.system.as_str(), t.user.as_str()])
        .collect::<Vec<_>>()
        .join("\n---\n");

        hex::encode(Sha256::digest(combined.as_bytes()))
    }
}

/// Format belief system modules as a bulleted prompt section body.
pub fn format_belief_modules(modules: &[BeliefSystemModule]) -> String {
    modules
        .iter()
        .map(|m| {
            let assumptions = m
                .core_assumptions
                .iter()
                .map(|a| format!("  - {}", a))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "- **{}** ({}): {}\n  Core assumptions:\n{}",
                m.display_name, m.label, m.description, assumptions
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format items as a prompt list. `detail` renders the last line of each entry.
pub fn format_items<F>(items: &[ExtractedItem], detail: F) -> String
where
    F: Fn(&ExtractedItem) -> String,
{
    items
        .iter()
        .map(|item| {
            let speaker = item
                .speaker
                .as_deref()
                .map(|s| format!(" (speaker: {})", s))
                .unwrap_or_default();
            format!(
                "- ID: {}\n  Type: {}{}\n  Content: {}\n  {}",
                item.id,
                item.item_type,
                speaker,
                item.content,
                detail(item)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.extraction.system.contains("{{categories_section}}"));
        assert!(prompts.classification.system.contains("{{categories}}"));
        assert!(!prompts.topics.user.is_empty());
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let vars = HashMap::from([
            ("a".to_string(), "{{b}}".to_string()),
            ("b".to_string(), "{{a}}".to_string()),
        ]);
        // Repeat so either HashMap order would show up.
        for _ in 0..16 {
            assert_eq!(Prompts::render("{{a}}|{{b}}", &vars), "{{b}}|{{a}}");
        }
    }

    #[test]
    fn test_render_keeps_unknown_placeholders_and_braces() {
        let vars = HashMap::from([("x".to_string(), "1".to_string())]);
        assert_eq!(
            Prompts::render(r#"{{missing}} {"k": {{x}}} {{{x}}} {{x"#, &vars),
            r#"{{missing}} {"k": 1} {1} {{x"#
        );
    }

    #[test]
    fn test_provided_vars_override_custom() {
        let mut custom = HashMap::new();
        custom.insert("tone".to_string(), "formal".to_string());
        custom.insert("name".to_string(), "custom".to_string());
        let prompts = Prompts::load(None, Some(&custom)).unwrap();

        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "given".to_string());
        let result = prompts.render_with_custom("{{name}} / {{tone}}", &vars);
        assert_eq!(result, "given / formal");
    }

    #[test]
    fn test_custom_dir_overrides_one_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("topics.toml"),
            "system = \"custom system\"\nuser = \"custom {{items}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.topics.system, "custom system");
        assert_eq!(prompts.extraction, PromptTemplate::extraction());
    }

    #[test]
    fn test_format_belief_modules() {
        let module = BeliefSystemModule {
            label: "stoicism".to_string(),
            display_name: "Stoicism".to_string(),
            description: "Virtue is the only good.".to_string(),
            core_assumptions: vec!["Focus on what you control".to_string()],
            example_claims: vec![],
        };
        let text = format_belief_modules(&[module]);
        assert!(text.starts_with("- **Stoicism** (stoicism): Virtue is the only good."));
        assert!(text.ends_with("  - Focus on what you control"));
    }

    #[test]
    fn test_templates_hash_tracks_changes() {
        let a = Prompts::default();
        let mut b = Prompts::default();
        assert_eq!(a.templates_hash(), b.templates_hash());
        assert_eq!(a.templates_hash().len(), 64);

        b.topics.system.push('!');
        assert_ne!(a.templates_hash(), b.templates_hash());
    }
}
