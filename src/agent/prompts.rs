//! Prompt builders for the planner and coder roles.

use crate::model::ChatPrompt;

use super::state::Plan;

const PLANNER_SYSTEM: &str = "You are an AI planner that creates programmatic solutions.";

const CODER_SYSTEM: &str = "You are a Python code generation expert.";

/// Builds the planner prompt for a request.
pub struct PlannerPromptBuilder {
    request: String,
    libraries: Vec<String>,
}

impl PlannerPromptBuilder {
    /// Creates a new planner prompt builder.
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            libraries: default_libraries(),
        }
    }

    /// Replaces the list of libraries the plan may rely on.
    pub fn with_libraries(mut self, libraries: Vec<String>) -> Self {
        self.libraries = libraries;
        self
    }

    /// Builds the system message.
    pub fn build_system(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(PLANNER_SYSTEM);
        prompt.push_str("\n\n");

        prompt.push_str("## Constraints\n\n");
        prompt.push_str("- Only create plans that can be executed programmatically with Python code\n");
        prompt.push_str("- Do NOT include manual steps like \"open browser\" or \"click on\"\n");
        prompt.push_str("- Each step should be a specific programming task\n");
        prompt.push_str("- Available libraries: ");
        prompt.push_str(&self.libraries.join(", "));
        prompt.push('\n');
        prompt.push_str("- NO subprocess, os.system, or shell commands allowed\n\n");

        prompt.push_str("## Output Format\n\n");
        prompt.push_str("Respond with ONLY a single, valid JSON object with a single key ");
        prompt.push_str("'plan', which is a list of strings:\n");
        prompt.push_str("```json\n");
        prompt.push_str("{\"plan\": [\"first step\", \"second step\"]}\n");
        prompt.push_str("```\n");

        prompt
    }

    /// Builds the user message.
    pub fn build_user(&self) -> String {
        format!("User Request: {}", self.request)
    }

    /// Builds the full chat prompt, asking for JSON output.
    pub fn build(&self) -> ChatPrompt {
        ChatPrompt::new(self.build_system(), self.build_user()).expect_json()
    }
}

/// Builds the coder prompt for one plan step.
pub struct CoderPromptBuilder<'a> {
    plan: &'a Plan,
    step: usize,
    previous_output: Option<String>,
}

impl<'a> CoderPromptBuilder<'a> {
    /// Creates a builder for step `step` of `plan`.
    pub fn new(plan: &'a Plan, step: usize) -> Self {
        Self {
            plan,
            step,
            previous_output: None,
        }
    }

    /// Includes the stdout of the previous step for context.
    pub fn with_previous_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.trim().is_empty() {
            self.previous_output = Some(output);
        }
        self
    }

    /// Builds the system message.
    pub fn build_system(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(CODER_SYSTEM);
        prompt.push_str("\n\n");

        prompt.push_str("## Requirements\n\n");
        prompt.push_str("- Write ONLY Python code that uses allowed libraries\n");
        prompt.push_str("- FORBIDDEN: os, subprocess, shutil, sys, exec, eval\n");
        prompt.push_str("- Do NOT wrap code in functions or classes\n");
        prompt.push_str("- Do NOT use markdown code blocks\n");
        prompt.push_str("- Write direct executable Python statements\n");
        prompt.push_str("- Always include proper error handling with try/except blocks\n");
        prompt.push_str("- Always include print statements to show progress\n");

        prompt
    }

    /// Builds the user message.
    pub fn build_user(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Full Plan\n\n");
        for (i, step) in self.plan.steps().iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, step));
        }
        prompt.push('\n');

        if let Some(output) = &self.previous_output {
            prompt.push_str("## Output of the Previous Step\n\n");
            prompt.push_str(output);
            prompt.push_str("\n\n");
        }

        prompt.push_str("## Current Step\n\n");
        prompt.push_str("Write Python code for this specific step: '");
        prompt.push_str(self.plan.step(self.step).unwrap_or_default());
        prompt.push_str("'\n\n");
        prompt.push_str("Make sure the code is safe and uses only allowed libraries.\n");

        prompt
    }

    /// Builds the full chat prompt.
    pub fn build(&self) -> ChatPrompt {
        ChatPrompt::new(self.build_system(), self.build_user())
    }
}

fn default_libraries() -> Vec<String> {
    ["requests", "beautifulsoup4", "json", "csv", "pandas", "numpy"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
