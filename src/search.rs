//! `neurorag search`: retrieval only, no language model involved.

use anyhow::Result;

use crate::config::Config;
use crate::index::ArtifactTrust;
use crate::models::{RetrievalResult, SourceRef};
use crate::retriever::Retriever;

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    trust: ArtifactTrust,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if k == Some(0) {
        anyhow::bail!("-k must be at least 1");
    }

    let retriever = Retriever::from_config(config, trust).await?;
    let result = retriever.retrieve(query, k).await?;
    print!("{}", format_results(&result));
    Ok(())
}

/// Ranked listing: one header line per hit followed by an indented snippet.
pub fn format_results(result: &RetrievalResult) -> String {
    if result.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = String::new();
    for (i, hit) in result.hits.iter().enumerate() {
        let source = SourceRef::from(&hit.chunk.metadata);
        out.push_str(&format!(
            "{}. [{:.4}] {} (chunk {})\n",
            i + 1,
            hit.distance,
            source,
            hit.chunk.chunk_index
        ));
        out.push_str(&format!("    {}\n", snippet(&hit.chunk.text, 200)));
    }
    out
}

/// First `max_chars` characters on one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
