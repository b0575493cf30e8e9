//! `neurorag ask` and `neurorag chat`: question answering from the terminal.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::chat_log::ChatLog;
use crate::config::Config;
use crate::index::ArtifactTrust;
use crate::retriever::Retriever;
use crate::session::{Conversation, RagPipeline};
use crate::synth;

/// Load the index, create the synthesizer and attach the chat log.
pub async fn build_pipeline(config: &Config, trust: ArtifactTrust) -> Result<RagPipeline> {
    let retriever = Retriever::from_config(config, trust).await?;
    let synthesizer = synth::create_synthesizer(&config.llm)?;
    let mut pipeline = RagPipeline::new(retriever, synthesizer);
    if config.log.enabled {
        pipeline = pipeline.with_chat_log(ChatLog::new(&config.log.dir));
    }
    Ok(pipeline)
}

fn conversation_for(user: Option<String>) -> Conversation {
    match user {
        Some(name) => Conversation::for_user(name),
        None => Conversation::new(),
    }
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    user: Option<String>,
    trust: ArtifactTrust,
) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }
    let pipeline = build_pipeline(config, trust).await?;
    let mut conversation = conversation_for(user);
    let reply = pipeline.ask(&mut conversation, question).await?;
    println!("{}", reply.rendered);
    Ok(())
}

/// Interactive loop on stdin. `exit`, `quit` or EOF ends the session.
///
/// A failed question prints an error and the loop carries on with the
/// conversation as it was.
pub async fn run_chat(
    config: &Config,
    user: Option<String>,
    trust: ArtifactTrust,
) -> Result<()> {
    let pipeline = build_pipeline(config, trust).await?;
    let mut conversation = conversation_for(user);

    println!("Welcome to NeuroRAG. Ask about your documents; type `exit` to leave.");
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let question = line?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match pipeline.ask(&mut conversation, question).await {
            Ok(reply) => println!("\n{}\n", reply.rendered),
            Err(err) => {
                tracing::error!(error = %err, "question failed");
                eprintln!("Error: {}", err);
            }
        }
    }

    Ok(())
}
