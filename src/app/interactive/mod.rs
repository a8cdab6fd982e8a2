//! Menu-driven interactive session.
//!
//! The controller owns only the control flow. Reading input and drawing
//! screens go through [`Console`], so the terminal front end and the tests
//! drive the same state machine.

use crate::core::{AssistError, ConversationSession, Engine, Scenario, ScenarioDefinition};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    SelectScenario,
    ShowHelp,
    ShowSamples(Scenario),
    AwaitQuestion(Scenario),
    Generating { scenario: Scenario, question: String },
    ShowAnswer { answer: String, elapsed: Duration },
    AskContinue,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Interrupt,
}

#[derive(Debug, Clone, Copy)]
pub enum Prompt<'a> {
    Scenario { choices: usize },
    Question(&'a ScenarioDefinition),
    Continue,
}

#[derive(Debug)]
pub enum View<'a> {
    Menu(&'a [ScenarioDefinition]),
    Help,
    Samples(&'a ScenarioDefinition),
    InvalidChoice(&'a str),
    EmptyQuestion,
    Generating(&'a ScenarioDefinition),
    Answer { answer: &'a str, elapsed: Duration },
    Failure(&'a AssistError),
    Farewell,
}

pub trait Console {
    fn read(&mut self, prompt: Prompt<'_>) -> Input;
    fn show(&mut self, view: View<'_>);
}

const QUIT: &str = "quit";
const HELP: &str = "help";

fn is_stop_answer(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "n" | "no" | "quit" | "否")
}

pub struct InteractiveController<'s, E> {
    session: &'s mut ConversationSession<E>,
    max_tokens: usize,
    state: State,
}

impl<'s, E: Engine> InteractiveController<'s, E> {
    pub fn new(session: &'s mut ConversationSession<E>, max_tokens: usize) -> Self {
        Self {
            session,
            max_tokens,
            state: State::SelectScenario,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }

    /// Runs until the user quits or interrupts.
    pub fn run<C: Console>(&mut self, console: &mut C) {
        while !self.is_terminated() {
            self.step(console);
        }
    }

    /// Performs one transition and returns the new state.
    pub fn step<C: Console>(&mut self, console: &mut C) -> &State {
        let current = std::mem::replace(&mut self.state, State::Terminated);
        let next = self.transition(current, console);
        if next == State::Terminated {
            console.show(View::Farewell);
        }
        self.state = next;
        &self.state
    }

    fn transition<C: Console>(&mut self, state: State, console: &mut C) -> State {
        let registry = self.session.registry();

        match state {
            State::SelectScenario => {
                console.show(View::Menu(registry.list()));
                let line = match console.read(Prompt::Scenario {
                    choices: registry.list().len(),
                }) {
                    Input::Line(line) => line,
                    Input::Interrupt => return State::Terminated,
                };
                let choice = line.trim();

                if choice == QUIT {
                    State::Terminated
                } else if choice == HELP {
                    State::ShowHelp
                } else if let Some(scenario) = registry.menu_choice(choice) {
                    State::ShowSamples(scenario)
                } else {
                    console.show(View::InvalidChoice(choice));
                    State::SelectScenario
                }
            }
            State::ShowHelp => {
                console.show(View::Help);
                State::SelectScenario
            }
            State::ShowSamples(scenario) => {
                console.show(View::Samples(registry.get(scenario)));
                State::AwaitQuestion(scenario)
            }
            State::AwaitQuestion(scenario) => {
                let line = match console.read(Prompt::Question(registry.get(scenario))) {
                    Input::Line(line) => line,
                    Input::Interrupt => return State::Terminated,
                };
                let question = line.trim();

                if question.is_empty() {
                    console.show(View::EmptyQuestion);
                    State::AwaitQuestion(scenario)
                } else {
                    State::Generating {
                        scenario,
                        question: question.to_string(),
                    }
                }
            }
            State::Generating { scenario, question } => {
                console.show(View::Generating(registry.get(scenario)));
                let started = Instant::now();

                match self.session.ask_scenario(&question, scenario, self.max_tokens) {
                    Ok(answer) => State::ShowAnswer {
                        answer,
                        elapsed: started.elapsed(),
                    },
                    Err(e) => {
                        console.show(View::Failure(&e));
                        State::SelectScenario
                    }
                }
            }
            State::ShowAnswer { answer, elapsed } => {
                console.show(View::Answer {
                    answer: &answer,
                    elapsed,
                });
                State::AskContinue
            }
            State::AskContinue => match console.read(Prompt::Continue) {
                Input::Line(line) if is_stop_answer(line.trim()) => State::Terminated,
                Input::Line(_) => State::SelectScenario,
                Input::Interrupt => State::Terminated,
            },
            State::Terminated => State::Terminated,
        }
    }
}
