//! CLI output formatting utilities

use crate::rag::QaOutcome;
use crate::resolve::Resolution;
use crate::Result;

/// Print a QA outcome for humans, or as JSON
pub fn print_outcome(outcome: &QaOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    match outcome {
        QaOutcome::Answer { answer } => println!("{answer}"),
        QaOutcome::Clarification { candidates } => {
            println!("🤔 Which member did you mean?");
            for candidate in candidates {
                println!("  - {candidate}");
            }
        }
    }
    Ok(())
}

/// Print the resolution of a question
pub fn print_resolution(question: &str, resolution: &Resolution) {
    println!("❓ {question}");
    match resolution {
        Resolution::Resolved(name) => println!("✅ Resolved: {name}"),
        Resolution::Multiple(names) => {
            println!("👥 Multiple members:");
            for name in names {
                println!("  - {name}");
            }
        }
        Resolution::Ambiguous(candidates) => {
            println!("🤔 Ambiguous between:");
            for candidate in candidates {
                println!("  - {candidate}");
            }
        }
        Resolution::Unresolved => println!("➖ No known member mentioned (unfiltered search)"),
    }
}
