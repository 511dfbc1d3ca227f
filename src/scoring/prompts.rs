//! Prompt text for batch scoring, single-dimension backfill and JSON repair

use crate::domain::{Dimension, Post, TopicCategory};
use crate::scoring::validator::truncate_chars;

/// Maximum characters of post text embedded in a prompt
pub const MAX_POST_LENGTH: usize = 2000;

pub const SYSTEM_PROMPT: &str = "You rate neighborhood social-feed posts for a comedy podcast \
that reads the best ones aloud. Be consistent across posts and reply with JSON only: no prose, \
no markdown.";

fn rubric() -> String {
    Dimension::ALL
        .iter()
        .map(|d| {
            format!(
                "- {}: {} (1 = not at all, 5 = somewhat, 10 = extremely)",
                d.as_str(),
                d.description()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn category_list() -> String {
    TopicCategory::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

fn numbered_posts(posts: &[Post]) -> String {
    posts
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let text = truncate_chars(&p.text, MAX_POST_LENGTH);
            format!("### Post {} (id={})\n{}", i, p.id, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt asking for every dimension, categories and text for each post
pub fn batch_prompt(posts: &[Post]) -> String {
    let example_scores = Dimension::ALL
        .iter()
        .map(|d| format!("\"{}\": N", d.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Rate each post below on every dimension, using whole or decimal numbers from 1 to 10.\n\
         \n\
         {rubric}\n\
         \n\
         Give each post one to three topic categories, chosen only from: {categories}\n\
         Add a one-sentence \"summary\" of the post and a one-sentence \"why_podcast_worthy\" \
         saying what would make it fun on the show.\n\
         \n\
         {posts}\n\
         \n\
         Reply with a single JSON array containing one object per post, in the same order, \
         with no code fences or trailing commas. Escape double quotes inside strings.\n\
         [{{\"post_index\": 0, \"scores\": {{{example_scores}}}, \"categories\": [\"...\"], \
         \"summary\": \"...\", \"why_podcast_worthy\": \"...\"}}]",
        rubric = rubric(),
        categories = category_list(),
        posts = numbered_posts(posts),
        example_scores = example_scores,
    )
}

/// Prompt asking for a single dimension only
pub fn dimension_prompt(posts: &[Post], dimension: Dimension) -> String {
    format!(
        "Rate each post below on one dimension only, from 1 to 10.\n\
         \n\
         - {name}: {description} (1 = not at all, 5 = somewhat, 10 = extremely)\n\
         \n\
         {posts}\n\
         \n\
         Reply with a single JSON array, one object per post, with no code fences:\n\
         [{{\"post_index\": 0, \"{name}\": N}}]",
        name = dimension.as_str(),
        description = dimension.description(),
        posts = numbered_posts(posts),
    )
}

/// Follow-up sent after a response that could not be parsed
pub fn correction_prompt(error: &str) -> String {
    format!(
        "That reply could not be parsed as the requested JSON ({}). \
         Send the complete answer again as a bare JSON array: no markdown, no code fences, \
         no trailing commas, and escape any double quotes inside strings.",
        error
    )
}
