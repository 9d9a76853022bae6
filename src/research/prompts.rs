// Prompt text for the research pipeline

use crate::models::{SubtaskAngle, SubtaskResult};
use crate::utils::truncate_chars;

/// How much of the caller's context is echoed into the recombination template
pub const CONTEXT_ECHO_CHARS: usize = 500;

/// System prompt shared by every subtask call
pub const RESEARCHER_SYSTEM_PROMPT: &str = r#"You are a meticulous research analyst preparing source material for content writers.

Guidelines:
- Be specific: prefer concrete figures, named examples and dated trends over generalities
- Say so explicitly when information is uncertain or may be outdated
- Stay within the research angle you are given; other analysts cover the other angles
- Write in Markdown with short sections and bullet points
"#;

/// System prompt for the recombination call
pub const SYNTHESIZER_SYSTEM_PROMPT: &str = r#"You are a senior research editor. You merge independent research notes into one cohesive, well-structured document without inventing facts that are not supported by the notes."#;

/// Section skeleton every synthesized document follows
pub const DOCUMENT_SECTIONS: [&str; 6] = [
    "Executive Summary",
    "Market Overview",
    "Audience Analysis",
    "Pain Points",
    "Competitive Landscape",
    "Recommendations",
];

/// What each angle is asked to cover
fn angle_brief(angle: SubtaskAngle) -> &'static str {
    match angle {
        SubtaskAngle::MarketFacts => {
            "Current facts and market data: market size and growth, recent developments, \
             key statistics and the trends shaping the topic right now."
        }
        SubtaskAngle::AudienceAnalysis => {
            "Audience and pain-point analysis: who cares about this topic, their goals, \
             the problems and frustrations they face, and the questions they ask."
        }
        SubtaskAngle::CompetitiveLandscape => {
            "Competitive landscape and best practices: the main players and alternatives, \
             how they position themselves, what works well and common mistakes to avoid."
        }
    }
}

fn entity_instructions(entity: &str) -> String {
    format!(
        "\nNamed entity: \"{entity}\"\n\
         Look up information specific to {entity} (offering, positioning, customers, recent news) \
         and keep it clearly separate from general statements about the market.\n"
    )
}

fn sources_block(sources: &[String]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let mut block = String::from("\nPreferred references (use where relevant):\n");
    for source in sources {
        block.push_str(&format!("- {}\n", source));
    }
    block
}

/// Full prompt for one research angle
pub fn build_subtask_prompt(
    angle: SubtaskAngle,
    topic: &str,
    context: &str,
    entity: Option<&str>,
    sources: &[String],
) -> String {
    let mut prompt = format!(
        "Research topic: {topic}\n\n\
         Your research angle ({index} of 3): {title}\n\
         {brief}\n",
        topic = topic,
        index = angle.index() + 1,
        title = angle.title(),
        brief = angle_brief(angle),
    );

    if !context.trim().is_empty() {
        prompt.push_str(&format!("\nAdditional context from the requester:\n{}\n", context.trim()));
    }
    if let Some(entity) = entity {
        prompt.push_str(&entity_instructions(entity));
    }
    prompt.push_str(&sources_block(sources));

    prompt.push_str(&format!(
        "\nRespond with a Markdown section titled \"## {}\" containing your findings.",
        angle.title()
    ));
    prompt
}

/// Shortened prompt used once normal attempts are exhausted
pub fn build_degraded_prompt(angle: SubtaskAngle, topic: &str, entity: Option<&str>) -> String {
    let subject = match entity {
        Some(entity) => format!("{} ({})", topic, entity),
        None => topic.to_string(),
    };
    format!(
        "Give only the essential information about \"{}\" from this angle: {}. \
         Answer in at most five bullet points.",
        subject,
        angle.title()
    )
}

/// Text used in place of a subtask that could not be researched
pub fn placeholder_text(angle: SubtaskAngle, topic: &str) -> String {
    format!(
        "_Section {} ({}) for \"{}\" could not be researched. \
         The completion service did not return usable content for this angle._",
        angle.index() + 1,
        angle.title(),
        topic
    )
}

/// Instructions for merging the subtask outputs into one document
pub fn build_recombination_template(topic: &str, context: &str) -> String {
    let mut template = format!(
        "Synthesize the research notes below into a single cohesive document about \"{}\".\n\n\
         Use exactly these top-level sections, in this order:\n",
        topic
    );
    for (i, section) in DOCUMENT_SECTIONS.iter().enumerate() {
        template.push_str(&format!("{}. ## {}\n", i + 1, section));
    }
    template.push_str(
        "\nResolve overlaps between notes, keep concrete figures and examples, \
         and mark any section whose notes say it could not be researched.\n",
    );

    if !context.trim().is_empty() {
        template.push_str(&format!(
            "\nOriginal request context (for traceability):\n> {}\n",
            truncate_chars(context.trim(), CONTEXT_ECHO_CHARS).replace('\n', "\n> ")
        ));
    }
    template
}

/// Recombination prompt with every subtask output under a labeled header
pub fn build_synthesis_prompt(template: &str, results: &[SubtaskResult]) -> String {
    let mut prompt = String::from(template);
    prompt.push_str("\n---\n\n# Research Notes\n\n");

    for result in results {
        prompt.push_str(&format!(
            "## Note {} - {}{}\n\n{}\n\n---\n\n",
            result.index + 1,
            result.angle.title(),
            if result.degraded { " (limited)" } else { "" },
            result.text.trim()
        ));
    }
    prompt
}
