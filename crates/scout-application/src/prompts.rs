//! Prompt templates for the reasoning, summarization, and answer calls.
//!
//! Every prompt is rendered deterministically from context state: the same
//! context and query always produce byte-identical prompts, which keeps the
//! reasoning step reproducible and testable.

use minijinja::{Environment, context};
use once_cell::sync::Lazy;
use scout_core::agent::Observation;
use scout_core::context::{ConversationContext, Turn};
use scout_core::error::{Result, ScoutError};
use std::collections::BTreeMap;

const REASONING_TEMPLATE: &str = r#"You are a sales-intelligence assistant helping a sales team work a list of contractors.

Decide the single next action for the question below. Reply with ONE JSON object and nothing else, in one of these forms:
{"action": "retrieve", "query": "<index search text>", "top_k": <optional number>}
{"action": "web_lookup", "query": "<web search text>"}
{"action": "answer", "content": "<final recommendation for the sales team>"}

Do not repeat an action that already failed or already produced the facts below.

Conversation so far:
{% for turn in turns -%}
[{{ turn.role }}] {{ turn.content }}
{% endfor %}
{%- if facts %}
Known facts (already gathered, do not re-fetch):
{% for key, value in facts|items -%}
- {{ value }}
{% endfor %}
{%- endif %}
{%- if observations %}
Tool results this query:
{% for obs in observations -%}
{% if obs.failed -%}
- FAILED {{ obs.kind }}: {{ obs.reason }}
{% else -%}
- {{ obs.kind }}: {{ obs.content }}
{% endif -%}
{% endfor %}
{%- endif %}
Sales team question: {{ query }}"#;

const SUMMARY_TEMPLATE: &str = r#"Condense the following conversation turns into a short factual summary. Keep contractor names, decisions, and open questions; drop pleasantries. Reply with the summary text only.

{% for turn in turns -%}
[{{ turn.role }}] {{ turn.content }}
{% endfor %}"#;

const ANSWER_TEMPLATE: &str = r#"Write a concise, actionable recommendation for the sales team answering their question. Base it only on the gathered facts below; focus on helping them engage decision-makers.

Question: {{ query }}

Gathered facts:
{% for key, value in facts|items -%}
- {{ value }}
{% endfor %}

Your answer:"#;

static ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.add_template("reasoning", REASONING_TEMPLATE)
        .expect("reasoning template is valid");
    env.add_template("summary", SUMMARY_TEMPLATE)
        .expect("summary template is valid");
    env.add_template("answer", ANSWER_TEMPLATE)
        .expect("answer template is valid");
    env
});

fn render(name: &str, ctx: minijinja::Value) -> Result<String> {
    let template = ENV
        .get_template(name)
        .map_err(|e| ScoutError::internal(format!("missing prompt template '{name}': {e}")))?;
    template
        .render(ctx)
        .map_err(|e| ScoutError::internal(format!("prompt template '{name}' failed: {e}")))
}

/// Builds the action-decision prompt from the current context state.
pub fn render_reasoning(
    query: &str,
    context: &ConversationContext,
    observations: &[Observation],
) -> Result<String> {
    render(
        "reasoning",
        context! {
            query => query,
            turns => context.turns,
            facts => context.working_memory,
            observations => observations,
        },
    )
}

/// Builds the summarization prompt over the turns to condense.
pub fn render_summary(turns: &[Turn]) -> Result<String> {
    render("summary", context! { turns => turns })
}

/// Builds the final-answer prompt over the gathered working memory.
pub fn render_final_answer(query: &str, facts: &BTreeMap<String, String>) -> Result<String> {
    render("answer", context! { query => query, facts => facts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::agent::ObservationKind;
    use scout_core::context::TurnRole;

    fn sample_context() -> ConversationContext {
        let mut ctx = ConversationContext::new("s1");
        ctx.append_turn(TurnRole::User, "find roofers in brooklyn");
        ctx.record_fact("k1", "Apex Roofing | Brooklyn, NY | (718) 555-0100");
        ctx
    }

    #[test]
    fn reasoning_prompt_is_deterministic() {
        let ctx = sample_context();
        let obs = vec![Observation::failure(
            ObservationKind::Retrieval,
            "index unreachable",
        )];
        let a = render_reasoning("who should we call?", &ctx, &obs).unwrap();
        let b = render_reasoning("who should we call?", &ctx, &obs).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reasoning_prompt_carries_failures_and_facts() {
        let ctx = sample_context();
        let obs = vec![Observation::failure(
            ObservationKind::Retrieval,
            "index unreachable",
        )];
        let prompt = render_reasoning("who should we call?", &ctx, &obs).unwrap();

        assert!(prompt.contains("FAILED retrieval: index unreachable"));
        assert!(prompt.contains("Apex Roofing"));
        assert!(prompt.contains("who should we call?"));
        assert!(prompt.contains(r#""action": "web_lookup""#));
    }

    #[test]
    fn summary_prompt_lists_all_turns() {
        let ctx = sample_context();
        let prompt = render_summary(&ctx.turns).unwrap();
        assert!(prompt.contains("[user] find roofers in brooklyn"));
    }

    #[test]
    fn answer_prompt_renders_facts_in_key_order() {
        let mut facts = BTreeMap::new();
        facts.insert("b".to_string(), "second fact".to_string());
        facts.insert("a".to_string(), "first fact".to_string());
        let prompt = render_final_answer("who?", &facts).unwrap();

        let first = prompt.find("first fact").unwrap();
        let second = prompt.find("second fact").unwrap();
        assert!(first < second);
    }
}
