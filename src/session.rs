//! Question answering over a conversation.
//!
//! A [`Conversation`] is owned by the caller (the chat loop, an HTTP
//! request, a test) and passed into [`RagPipeline::ask`]. The pipeline
//! itself holds no per-user state.

use serde::Serialize;
use std::sync::Arc;

use crate::chat_log::ChatLog;
use crate::error::Result;
use crate::models::SourceRef;
use crate::prompt::{self, Answer};
use crate::retriever::Retriever;
use crate::synth::AnswerSynthesizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Ordered chat history plus the optional name used for logging.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    user: Option<String>,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank names count as anonymous.
    pub fn for_user(user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            user: Some(user).filter(|u| !u.trim().is_empty()),
            messages: Vec::new(),
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }
}

/// Result of one [`RagPipeline::ask`].
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub answer: Answer,
    pub sources: Vec<SourceRef>,
    /// Answer plus the source footer, as shown to the user.
    pub rendered: String,
}

/// Retrieval, synthesis and optional chat logging wired together.
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Retriever,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    chat_log: Option<ChatLog>,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, synthesizer: Arc<dyn AnswerSynthesizer>) -> Self {
        Self {
            retriever,
            synthesizer,
            chat_log: None,
        }
    }

    pub fn with_chat_log(mut self, log: ChatLog) -> Self {
        self.chat_log = Some(log);
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `question` within `conversation`.
    ///
    /// The user turn is recorded before anything can fail; the assistant
    /// turn only once an answer exists. On error the conversation keeps
    /// every earlier message.
    pub async fn ask(&self, conversation: &mut Conversation, question: &str) -> Result<Reply> {
        conversation.push(Role::User, question);

        let context = self.retriever.retrieve(question, None).await?;
        let answer = self.synthesizer.synthesize(question, &context).await?;
        let sources = context.sources();
        let rendered = prompt::render_reply(&answer, &sources);

        conversation.push(Role::Assistant, rendered.clone());

        if let (Some(log), Some(user)) = (&self.chat_log, conversation.user()) {
            // A logging failure must not cost the user their answer.
            if let Err(err) = log.record(user, question, &answer.text, &sources) {
                tracing::warn!(error = %err, "failed to append chat log");
            }
        }

        Ok(Reply {
            answer,
            sources,
            rendered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunker;
    use crate::embedding::{EmbeddingProvider, HashProvider};
    use crate::error::RagError;
    use crate::index::VectorIndex;
    use crate::models::{ContentKind, DocumentMetadata, SourceDocument};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Canned(&'static str);

    #[async_trait]
    impl AnswerSynthesizer for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl AnswerSynthesizer for Broken {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(RagError::synthesis_timeout("upstream timed out"))
        }
    }

    async fn retriever() -> Retriever {
        let provider = Arc::new(HashProvider::new(64));
        let doc = SourceDocument {
            text: "Support hours are nine to five on weekdays.".into(),
            metadata: DocumentMetadata::new("data/support.pdf", Some(1)),
            kind: ContentKind::Pdf,
        };
        let chunks = Chunker::new(100, 10).unwrap().chunk_documents(&[doc]);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = provider.embed(&texts).await.unwrap();
        let index = VectorIndex::build(chunks, vectors, HashProvider::MODEL_NAME, 64).unwrap();
        Retriever::new(Arc::new(index), provider, 3).unwrap()
    }

    #[tokio::test]
    async fn successful_ask_records_both_turns_and_footer() {
        let pipeline = RagPipeline::new(
            retriever().await,
            Arc::new(Canned(r#"{"answer": "Nine to five.", "has_sufficient_context": true}"#)),
        );
        let mut convo = Conversation::new();
        let reply = pipeline.ask(&mut convo, "When is support open?").await.unwrap();

        assert_eq!(reply.sources.len(), 1);
        assert!(reply.rendered.ends_with("- Page 1 from support.pdf"));
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn failed_ask_keeps_prior_history() {
        let mut convo = Conversation::new();
        convo.push(Role::User, "earlier");
        convo.push(Role::Assistant, "earlier answer");

        let pipeline = RagPipeline::new(retriever().await, Arc::new(Broken));
        let err = pipeline.ask(&mut convo, "anything").await.unwrap_err();
        assert!(matches!(err, RagError::Synthesis { .. }));
        assert_eq!(convo.messages().len(), 3);
        assert_eq!(convo.messages()[2].content, "anything");
    }

    #[tokio::test]
    async fn named_user_exchanges_are_logged() {
        let tmp = TempDir::new().unwrap();
        let pipeline = RagPipeline::new(retriever().await, Arc::new(Canned("Weekdays.")))
            .with_chat_log(ChatLog::new(tmp.path()));
        let mut convo = Conversation::for_user("grace");
        pipeline.ask(&mut convo, "Which days?").await.unwrap();

        let files: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn blank_user_is_anonymous() {
        assert_eq!(Conversation::for_user("  ").user(), None);
    }
}
