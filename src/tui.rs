//! Terminal front end for the interactive session.

use crate::format::human_duration;
use crate::progress::Progress;
use anyhow::Result;
use mindcare::app::interactive::{Console, Input, Prompt, View};
use mindcare::core::ScenarioDefinition;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const RULE: &str = "============================================================";

pub const HELP_TEXT: &str = "\
How to use:
  1. Pick a scenario by number or name.
  2. Type your question and press Enter.
  3. Answer 'n' at the continue prompt to leave, or type 'quit' at the menu.

Commands at the menu:
  help   show this screen
  quit   exit the assistant

This assistant offers general emotional support only. It is not a substitute
for professional diagnosis or treatment. If you are in crisis or thinking
about harming yourself, contact local emergency services or a crisis hotline
right away.";

pub fn banner() -> String {
    format!("{RULE}\n  MindCare - mental health support assistant\n{RULE}")
}

pub fn render_menu(definitions: &[ScenarioDefinition]) -> String {
    let mut out = String::from("\nChoose a scenario:\n");
    for (i, def) in definitions.iter().enumerate() {
        out.push_str(&format!("  {:>2}. {} ({})\n", i + 1, def.label, def.id));
    }
    out.push_str("Type 'help' for usage notes or 'quit' to exit.");
    out
}

pub fn render_samples(def: &ScenarioDefinition) -> String {
    let mut out = format!("\n[{}] Sample questions:\n", def.label);
    for question in &def.sample_questions {
        out.push_str(&format!("  - {}\n", question));
    }
    out.trim_end().to_string()
}

fn prompt_text(prompt: Prompt<'_>) -> String {
    match prompt {
        Prompt::Scenario { choices } => format!("\nSelect a scenario (1-{}): ", choices),
        Prompt::Question(def) => format!("\n[{}] Your question: ", def.label),
        Prompt::Continue => "\nContinue? (y/n): ".to_string(),
    }
}

pub struct TerminalConsole {
    editor: DefaultEditor,
    progress: Progress,
}

impl TerminalConsole {
    pub fn new() -> Result<Self> {
        println!("{}", banner());
        Ok(Self {
            editor: DefaultEditor::new()?,
            progress: Progress::new(),
        })
    }
}

impl Console for TerminalConsole {
    fn read(&mut self, prompt: Prompt<'_>) -> Input {
        let is_question = matches!(prompt, Prompt::Question(_));

        match self.editor.readline(&prompt_text(prompt)) {
            Ok(line) => {
                if is_question && !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Input::Line(line)
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Input::Interrupt,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read input");
                Input::Interrupt
            }
        }
    }

    fn show(&mut self, view: View<'_>) {
        match view {
            View::Menu(definitions) => println!("{}", render_menu(definitions)),
            View::Help => println!("\n{}", HELP_TEXT),
            View::Samples(def) => println!("{}", render_samples(def)),
            View::InvalidChoice(choice) => println!(
                "Invalid choice '{}'. Enter a menu number, a scenario name, 'help' or 'quit'.",
                choice
            ),
            View::EmptyQuestion => println!("Please enter a question."),
            View::Generating(def) => {
                self.progress.spinner(&format!("Thinking ({})...", def.label));
            }
            View::Answer { answer, elapsed } => {
                self.progress.stop_and_clear();
                println!("\n{}\n", answer.trim());
                println!("(answered in {})", human_duration(elapsed));
            }
            View::Failure(e) => {
                self.progress.stop_and_clear();
                eprintln!("Error: {}", e);
            }
            View::Farewell => {
                self.progress.stop_and_clear();
                println!("\nTake care of yourself. Goodbye!");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindcare::core::{Scenario, ScenarioRegistry};

    #[test]
    fn test_menu_lists_every_scenario_in_order() {
        let registry = ScenarioRegistry::default();
        let menu = render_menu(registry.list());

        assert!(menu.contains(" 1. Emotional Assessment (assessment)"));
        assert!(menu.contains("10. Work-Life Balance (work_stress)"));
        assert_eq!(menu.lines().filter(|l| l.trim_start().starts_with(char::is_numeric)).count(), 10);
    }

    #[test]
    fn test_samples_render_three_questions() {
        let registry = ScenarioRegistry::default();
        let text = render_samples(registry.get(Scenario::Mindfulness));
        assert_eq!(text.lines().filter(|l| l.starts_with("  - ")).count(), 3);
    }

    #[test]
    fn test_help_carries_disclaimer() {
        assert!(HELP_TEXT.contains("not a substitute"));
    }
}
