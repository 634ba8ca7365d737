//! Local fallback catalog of suggested questions, keyed by agent type.
//!
//! When the suggested-questions endpoint is down or returns nonsense, the
//! store falls back to these per-persona presets so the UI never shows an
//! empty suggestion strip.

use crate::types::Question;

/// Per-agent entry in the fallback catalog.
struct AgentQuestions {
    agent_type: &'static str,
    agent_name: &'static str,
    questions: &'static [(&'static str, &'static str)],
}

const DEFAULT_QUESTIONS: &[(&str, &str)] = &[
    ("default-ai-1", "How is AI changing everyday life?"),
    (
        "default-productivity-1",
        "How can I improve my productivity and learning?",
    ),
    ("default-life-1", "Can you share some practical life tips?"),
];

const CATALOG: &[AgentQuestions] = &[
    AgentQuestions {
        agent_type: "general",
        agent_name: "Companion",
        questions: DEFAULT_QUESTIONS,
    },
    AgentQuestions {
        agent_type: "coding",
        agent_name: "Coding Assistant",
        questions: &[
            (
                "coding-basics-1",
                "Which programming language suits a beginner best?",
            ),
            (
                "coding-practice-1",
                "What practice routines actually improve coding skills?",
            ),
            (
                "coding-debug-1",
                "How do I debug a problem I can't reproduce?",
            ),
        ],
    },
    AgentQuestions {
        agent_type: "writing",
        agent_name: "Writing Assistant",
        questions: &[
            (
                "writing-improve-1",
                "How can I improve my writing and expression?",
            ),
            ("writing-structure-1", "How do I structure an article clearly?"),
            ("writing-creativity-1", "How do I find writing inspiration?"),
        ],
    },
    AgentQuestions {
        agent_type: "business",
        agent_name: "Business Advisor",
        questions: &[
            ("business-strategy-1", "How do I build an effective business strategy?"),
            ("business-marketing-1", "What marketing approaches work in practice?"),
            ("business-management-1", "How can I manage a team more efficiently?"),
        ],
    },
    AgentQuestions {
        agent_type: "education",
        agent_name: "Education Assistant",
        questions: &[
            ("education-method-1", "What are some efficient study techniques?"),
            ("education-plan-1", "How do I put together a personal study plan?"),
            ("education-motivation-1", "How do I stay motivated to learn long term?"),
        ],
    },
    AgentQuestions {
        agent_type: "ticket",
        agent_name: "Ticket Assistant",
        questions: &[
            ("ticket-order-1", "Look up my recent ticket orders."),
            ("ticket-analysis-1", "Can you analyze ticket sales trends?"),
            ("ticket-report-1", "Generate a ticket order summary report."),
        ],
    },
];

fn catalog_entry(agent_type: &str) -> Option<&'static AgentQuestions> {
    CATALOG.iter().find(|entry| entry.agent_type == agent_type)
}

/// Fallback questions for an agent type; unknown types get the defaults.
pub fn fallback_questions(agent_type: &str) -> Vec<Question> {
    let questions = catalog_entry(agent_type)
        .map(|entry| entry.questions)
        .unwrap_or(DEFAULT_QUESTIONS);
    questions
        .iter()
        .map(|(id, text)| Question::new(*id, *text))
        .collect()
}

/// Display name for an agent type.
pub fn agent_name(agent_type: &str) -> &'static str {
    catalog_entry(agent_type)
        .map(|entry| entry.agent_name)
        .unwrap_or("Companion")
}

/// Agent types the catalog knows about.
pub fn known_agent_types() -> Vec<&'static str> {
    CATALOG.iter().map(|entry| entry.agent_type).collect()
}
