use crate::advisory::AdvisoryTopic;
use anyhow::{Context, Result};
use std::collections::HashMap;

/// Template keys every prompt book must provide.
pub const TEMPLATE_KEYS: [&str; 6] = [
    "greeting",
    "target",
    "coaching_reinforce",
    "coaching_redirect",
    "success",
    "finale",
];

/// Renders advisory topics into generator prompts.
///
/// Templates use `{placeholder}` markers that are replaced with the topic's
/// fields: `{player}`, `{target}`, `{detected}`, `{confidence}`,
/// `{attempt_ms}`, `{completed}`, `{next}` and `{last}`. Coaching templates
/// also get the session's performance as `{average}`, `{trend}` and
/// `{attempts}`, and the strategy's instruction as `{strategy}`.
#[derive(Debug, Clone)]
pub struct PromptBook {
    templates: HashMap<String, String>,
}

impl PromptBook {
    pub fn new(templates: HashMap<String, String>) -> Result<Self> {
        for key in TEMPLATE_KEYS {
            templates
                .get(key)
                .with_context(|| format!("{key}.md not found in prompts directory"))?;
        }
        Ok(Self { templates })
    }

    pub fn render(&self, topic: &AdvisoryTopic) -> Result<String> {
        let key = topic.template_key();
        let template = self
            .templates
            .get(key)
            .with_context(|| format!("missing prompt template '{key}'"))?;

        let rendered = match topic {
            AdvisoryTopic::Greeting { player } => template.replace("{player}", player),
            AdvisoryTopic::Target { label } => template.replace("{target}", label),
            AdvisoryTopic::Coaching {
                target,
                detected,
                confidence,
                attempt_ms,
                strategy,
                performance,
                ..
            } => template
                .replace("{target}", target)
                .replace("{detected}", detected)
                .replace("{confidence}", &format!("{confidence:.0}"))
                .replace("{attempt_ms}", &attempt_ms.to_string())
                .replace("{average}", &format!("{:.1}", performance.average))
                .replace("{trend}", &performance.trend.to_string())
                .replace("{attempts}", &performance.count.to_string())
                .replace("{strategy}", strategy.guidance()),
            AdvisoryTopic::Success { completed, next } => template
                .replace("{completed}", completed)
                .replace("{next}", next.as_deref().unwrap_or("")),
            AdvisoryTopic::Finale { completed, last } => template
                .replace("{completed}", &completed.to_string())
                .replace("{last}", last.as_deref().unwrap_or("nothing")),
        };
        Ok(rendered.trim().to_string())
    }
}
