//! Prompt text and output schemas for the three generation steps

use chrono::Utc;
use delve_core::OutputSchema;
use serde_json::json;

pub const PLANNER_SCHEMA: &str = "serp_queries";
pub const EXTRACTOR_SCHEMA: &str = "learnings";
pub const REPORT_SCHEMA: &str = "final_report";

/// Shared system prompt
pub fn system_prompt() -> String {
    format!(
        r#"You are an expert researcher. Today is {}. Follow these instructions when responding:
- You may be asked to research subjects that are after your knowledge cutoff; assume the user is right when presented with news.
- The user is a highly experienced analyst, no need to simplify it, be as detailed as possible and make sure your response is correct.
- Be highly organized.
- Suggest solutions that the user did not think about.
- Be proactive and anticipate the user's needs.
- Mistakes erode trust, so be accurate and thorough.
- Value good arguments over authorities; the source is irrelevant.
- Consider new technologies and contrarian ideas, not just the conventional wisdom.
- You may use high levels of speculation or prediction, just flag it for the user."#,
        Utc::now().format("%Y-%m-%d")
    )
}

pub fn planner_prompt(topic: &str, num_queries: usize, learnings: &str) -> String {
    let mut prompt = format!(
        "Given the following prompt from the user, generate a list of search queries to research the topic. \
         Return a maximum of {num_queries} queries, but feel free to return fewer if the original prompt is clear. \
         Make sure each query is unique and not similar to each other.\n\n<prompt>{topic}</prompt>"
    );

    if !learnings.is_empty() {
        prompt.push_str(&format!(
            "\n\nHere are some learnings from previous research, use them to generate more specific queries:\n\
             <learnings>\n{learnings}\n</learnings>"
        ));
    }

    prompt
}

pub fn planner_schema(num_queries: usize) -> OutputSchema {
    OutputSchema::Json {
        name: PLANNER_SCHEMA.to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "maxItems": num_queries,
                    "description": format!("List of search queries, max of {}", num_queries),
                    "items": {
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "The search query"
                            },
                            "researchGoal": {
                                "type": "string",
                                "description": "First talk about the goal of the research that this query is meant to accomplish, then go deeper into how to advance the research once the results are found, mention additional research directions. Be as specific as possible, especially for additional research directions."
                            }
                        },
                        "required": ["query", "researchGoal"]
                    }
                }
            },
            "required": ["queries"]
        }),
    }
}

pub fn extractor_prompt(query: &str, contents: &[String], max_learnings: usize) -> String {
    let contents = contents
        .iter()
        .map(|content| format!("<content>\n{}\n</content>", content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Given the following contents from a search for the query <query>{query}</query>, \
         generate a list of learnings from the contents. Return a maximum of {max_learnings} learnings, \
         but feel free to return fewer if the contents are clear. Make sure each learning is unique and \
         not similar to each other. The learnings should be concise and to the point, as detailed and \
         information dense as possible. Make sure to include any entities like people, places, companies, \
         products, things, etc in the learnings, as well as any exact metrics, numbers, or dates. \
         The learnings will be used to research the topic further.\n\n<contents>{contents}</contents>"
    )
}

pub fn extractor_schema(max_learnings: usize, max_follow_ups: usize) -> OutputSchema {
    OutputSchema::Json {
        name: EXTRACTOR_SCHEMA.to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "learnings": {
                    "type": "array",
                    "maxItems": max_learnings,
                    "items": { "type": "string" },
                    "description": format!("List of learnings, max of {}", max_learnings)
                },
                "followUpQuestions": {
                    "type": "array",
                    "maxItems": max_follow_ups,
                    "items": { "type": "string" },
                    "description": format!(
                        "List of follow-up questions to research the topic further, max of {}",
                        max_follow_ups
                    )
                }
            },
            "required": ["learnings", "followUpQuestions"]
        }),
    }
}

pub fn report_prompt(query: &str, learnings: &str) -> String {
    format!(
        "Given the following prompt from the user, write a final report on the topic using the learnings \
         from research. Make it as detailed as possible, aim for 3 or more pages, include ALL the learnings \
         from research. Do not add a sources section, one is appended automatically.\n\n\
         <prompt>{query}</prompt>\n\n\
         Here are all the learnings from previous research:\n\n<learnings>\n{learnings}\n</learnings>"
    )
}

pub fn report_schema() -> OutputSchema {
    OutputSchema::Text {
        name: REPORT_SCHEMA.to_string(),
    }
}

/// Query text for a follow-up branch
pub fn follow_up_query(research_goal: &str, follow_up_questions: &[String]) -> String {
    format!(
        "Previous research goal: {}\nFollow-up research directions: {}",
        research_goal,
        follow_up_questions
            .iter()
            .map(|question| format!("\n{}", question))
            .collect::<String>()
    )
}

/// Wrap each learning in a tag so the model can tell them apart
pub fn format_learnings(learnings: &[String]) -> Vec<String> {
    learnings
        .iter()
        .map(|learning| format!("<learning>\n{}\n</learning>", learning))
        .collect()
}
