//! Scenario registry: the closed set of assistant personas and their prompts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Assessment,
    Therapy,
    CopingStrategies,
    SelfCare,
    CrisisIntervention,
    Education,
    Motivation,
    Mindfulness,
    RelationshipSupport,
    WorkStress,
}

impl Scenario {
    /// Menu order. Menu choice `n` selects `ALL[n - 1]`.
    pub const ALL: [Scenario; 10] = [
        Scenario::Assessment,
        Scenario::Therapy,
        Scenario::CopingStrategies,
        Scenario::SelfCare,
        Scenario::CrisisIntervention,
        Scenario::Education,
        Scenario::Motivation,
        Scenario::Mindfulness,
        Scenario::RelationshipSupport,
        Scenario::WorkStress,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Scenario::Assessment => "assessment",
            Scenario::Therapy => "therapy",
            Scenario::CopingStrategies => "coping_strategies",
            Scenario::SelfCare => "self_care",
            Scenario::CrisisIntervention => "crisis_intervention",
            Scenario::Education => "education",
            Scenario::Motivation => "motivation",
            Scenario::Mindfulness => "mindfulness",
            Scenario::RelationshipSupport => "relationship_support",
            Scenario::WorkStress => "work_stress",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    fn definition(self) -> ScenarioDefinition {
        let (label, system_prompt, sample_questions): (&str, &str, &[&str]) = match self {
            Scenario::Assessment => (
                "Emotional Assessment",
                "You are a licensed psychologist. Carefully assess the user's described emotions, thoughts, and behaviors, and provide a professional preliminary evaluation of their mental state.",
                &[
                    "I've been feeling anxious for weeks. Could this be a sign of an anxiety disorder?",
                    "I often feel sad and unmotivated. How do I know if I might be depressed?",
                    "Lately, I\u{2019}ve been having trouble sleeping and concentrating \u{2014} could this be related to stress?",
                ],
            ),
            Scenario::Therapy => (
                "Therapy and Counseling",
                "You are a certified psychotherapist. Based on the user's emotional and psychological issues, suggest appropriate therapeutic approaches such as CBT, mindfulness, or counseling strategies.",
                &[
                    "What kinds of therapy are effective for treating anxiety or depression?",
                    "How can I find a good therapist that suits my needs?",
                    "What\u{2019}s the difference between cognitive behavioral therapy (CBT) and talk therapy?",
                ],
            ),
            Scenario::CopingStrategies => (
                "Coping Strategies",
                "You are a mental health counselor. Provide practical coping techniques and emotional regulation methods to help the user manage stress, anxiety, or depression.",
                &[
                    "How can I calm myself down when I feel overwhelmed?",
                    "What are some healthy ways to manage work-related stress?",
                    "How do I deal with constant negative thoughts?",
                ],
            ),
            Scenario::SelfCare => (
                "Self-care and Well-being",
                "You are a wellness coach specializing in mental health. Give evidence-based self-care recommendations, including lifestyle habits that promote psychological well-being.",
                &[
                    "What are some daily self-care habits that can improve my mental health?",
                    "How can I build emotional resilience in my daily life?",
                    "What\u{2019}s a good morning routine for better mental well-being?",
                ],
            ),
            Scenario::CrisisIntervention => (
                "Crisis Intervention",
                "You are a crisis counselor. Evaluate whether the described situation may require immediate professional or emergency help, and provide calm, safety-focused guidance.",
                &[
                    "What should I do if I have thoughts of self-harm?",
                    "How can I support a friend who might be in a mental health crisis?",
                    "When should I seek emergency help for mental distress?",
                ],
            ),
            Scenario::Education => (
                "Psychoeducation",
                "You are a psychology educator. Explain mental health concepts in a simple and empathetic way, helping the user understand their emotions and possible psychological conditions.",
                &[
                    "What exactly is anxiety and how does it affect the brain?",
                    "How does depression differ from just feeling sad?",
                    "What are common misconceptions about mental illness?",
                ],
            ),
            Scenario::Motivation => (
                "Self-esteem and Motivation",
                "You are a positive psychology expert. Provide supportive and encouraging messages that help the user build resilience and maintain motivation through difficult times.",
                &[
                    "I feel stuck and unmotivated \u{2014} how can I regain focus?",
                    "How do I stay positive during tough times?",
                    "What are practical ways to build self-confidence?",
                ],
            ),
            Scenario::Mindfulness => (
                "Mindfulness and Relaxation",
                "You are a mindfulness coach. Guide the user through relaxation and mindfulness practices to reduce anxiety and increase present-moment awareness.",
                &[
                    "How do I start practicing mindfulness or meditation?",
                    "What are simple breathing exercises to reduce anxiety?",
                    "How can mindfulness help me manage emotions?",
                ],
            ),
            Scenario::RelationshipSupport => (
                "Relationship and Communication",
                "You are a relationship therapist. Offer professional advice on communication, emotional boundaries, and healthy relationship dynamics.",
                &[
                    "How can I handle conflicts with my partner in a healthy way?",
                    "What are the signs of a toxic relationship?",
                    "How can I communicate my feelings more effectively?",
                ],
            ),
            Scenario::WorkStress => (
                "Work-Life Balance",
                "You are an occupational psychologist. Help the user address workplace stress, burnout, and work-life balance challenges with practical psychological tools.",
                &[
                    "How can I manage burnout from long working hours?",
                    "What are effective ways to balance work and personal life?",
                    "How can I deal with pressure from a demanding boss?",
                ],
            ),
        };

        ScenarioDefinition {
            id: self,
            label: label.to_string(),
            system_prompt: system_prompt.to_string(),
            sample_questions: sample_questions.iter().map(|q| q.to_string()).collect(),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|scenario| scenario.key() == s)
            .ok_or_else(|| UnknownScenario(s.to_string()))
    }
}

/// A scenario id that is not part of the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scenario: {0}")]
pub struct UnknownScenario(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDefinition {
    pub id: Scenario,
    pub label: String,
    pub system_prompt: String,
    pub sample_questions: Vec<String>,
}

/// Immutable scenario table, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    definitions: Vec<ScenarioDefinition>,
    default: Scenario,
}

impl ScenarioRegistry {
    pub fn new(default: Scenario) -> Self {
        Self {
            definitions: Scenario::ALL.iter().map(|s| s.definition()).collect(),
            default,
        }
    }

    pub fn default_scenario(&self) -> Scenario {
        self.default
    }

    pub fn get(&self, scenario: Scenario) -> &ScenarioDefinition {
        &self.definitions[scenario.index()]
    }

    pub fn try_lookup(&self, id: &str) -> Result<&ScenarioDefinition, UnknownScenario> {
        id.parse::<Scenario>().map(|scenario| self.get(scenario))
    }

    /// Resolves `id`, falling back to the default scenario for unknown ids.
    pub fn resolve(&self, id: &str) -> Scenario {
        match id.parse::<Scenario>() {
            Ok(scenario) => scenario,
            Err(unknown) => {
                tracing::warn!(
                    scenario = %unknown.0,
                    fallback = self.default.key(),
                    "unknown scenario, using default"
                );
                self.default
            }
        }
    }

    pub fn lookup(&self, id: &str) -> &ScenarioDefinition {
        self.get(self.resolve(id))
    }

    pub fn list(&self) -> &[ScenarioDefinition] {
        &self.definitions
    }

    /// Sample questions for `id`; empty when the id is unknown.
    pub fn sample_questions(&self, id: &str) -> &[String] {
        self.try_lookup(id)
            .map(|definition| definition.sample_questions.as_slice())
            .unwrap_or(&[])
    }

    /// Interprets interactive menu input: a 1-based menu number or a scenario key.
    pub fn menu_choice(&self, input: &str) -> Option<Scenario> {
        let input = input.trim();
        if let Ok(number) = input.parse::<usize>() {
            return number
                .checked_sub(1)
                .and_then(|idx| self.definitions.get(idx))
                .map(|definition| definition.id);
        }
        input.parse().ok()
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::new(Scenario::Assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_known_scenarios_have_stable_prompts() {
        let registry = ScenarioRegistry::default();
        for scenario in Scenario::ALL {
            let first = registry.lookup(scenario.key()).system_prompt.clone();
            let second = registry.lookup(scenario.key()).system_prompt.clone();
            assert!(!first.is_empty(), "{} has an empty prompt", scenario);
            assert_eq!(first, second);
            assert_eq!(registry.lookup(scenario.key()).id, scenario);
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ScenarioRegistry::default();
        let keys: HashSet<_> = registry.list().iter().map(|d| d.id.key()).collect();
        assert_eq!(keys.len(), registry.list().len());
        assert_eq!(registry.list().len(), 10);
    }

    #[test]
    fn test_unknown_ids_fall_back_to_default() {
        let registry = ScenarioRegistry::new(Scenario::Therapy);
        for id in ["nonexistent", "diagnosis", "", "ASSESSMENT"] {
            assert_eq!(registry.lookup(id), registry.get(Scenario::Therapy));
            assert_eq!(registry.resolve(id), Scenario::Therapy);
        }
    }

    #[test]
    fn test_try_lookup_reports_unknown() {
        let registry = ScenarioRegistry::default();
        assert_eq!(
            registry.try_lookup("diagnosis").unwrap_err(),
            UnknownScenario("diagnosis".to_string())
        );
        assert_eq!(
            registry.try_lookup("work_stress").unwrap().label,
            "Work-Life Balance"
        );
    }

    #[test]
    fn test_sample_questions() {
        let registry = ScenarioRegistry::default();
        assert_eq!(registry.sample_questions("mindfulness").len(), 3);
        assert!(registry.sample_questions("nonexistent").is_empty());
    }

    #[test]
    fn test_menu_choice() {
        let registry = ScenarioRegistry::default();
        assert_eq!(registry.menu_choice("1"), Some(Scenario::Assessment));
        assert_eq!(registry.menu_choice(" 10 "), Some(Scenario::WorkStress));
        assert_eq!(registry.menu_choice("self_care"), Some(Scenario::SelfCare));
        assert_eq!(registry.menu_choice("0"), None);
        assert_eq!(registry.menu_choice("11"), None);
        assert_eq!(registry.menu_choice("stress"), None);
    }

    #[test]
    fn test_serde_uses_keys() {
        let json = serde_json::to_string(&Scenario::CrisisIntervention).unwrap();
        assert_eq!(json, "\"crisis_intervention\"");
        let parsed: Scenario = serde_json::from_str("\"relationship_support\"").unwrap();
        assert_eq!(parsed, Scenario::RelationshipSupport);
    }
}
