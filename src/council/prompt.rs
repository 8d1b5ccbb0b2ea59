//! Prompt assembly for planners, the judge and refinement.

use super::anonymize::AnonymizedSet;
use crate::config::TaskSpec;

const PLANNER_PROMPT: &str = include_str!("../../prompts/planner.md");
const JUDGE_PROMPT: &str = include_str!("../../prompts/judge.md");
const REFINE_PROMPT: &str = include_str!("../../prompts/refine.md");

/// The task as every agent sees it: task text, constraints, repository context
pub fn task_brief(task: &TaskSpec) -> String {
    let mut brief = format!("## Task\n\n{}\n", task.task.trim());

    if !task.constraints.is_empty() {
        brief.push_str("\n## Constraints\n\n");
        for constraint in &task.constraints {
            brief.push_str(&format!("- {}\n", constraint.trim()));
        }
    }

    if let Some(repo) = &task.repo_context {
        let mut lines = Vec::new();
        if let Some(root) = &repo.root {
            lines.push(format!("- Repository root: `{}`", root.display()));
        }
        for path in &repo.paths {
            lines.push(format!("- Relevant path: `{}`", path.display()));
        }
        if let Some(notes) = repo.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            lines.push(format!("- Notes: {}", notes.trim()));
        }
        if !lines.is_empty() {
            brief.push_str("\n## Repository Context\n\n");
            brief.push_str(&lines.join("\n"));
            brief.push('\n');
        }
    }

    brief
}

pub fn planner_prompt(brief: &str, plan_template: &str) -> String {
    PLANNER_PROMPT
        .replace("{{BRIEF}}", brief.trim_end())
        .replace("{{PLAN_TEMPLATE}}", plan_template.trim_end())
}

pub fn judge_prompt(
    brief: &str,
    plans: &AnonymizedSet,
    judge_template: &str,
    plan_template: &str,
) -> String {
    let rendered = if plans.plans.is_empty() {
        "_No planner produced a valid plan._".to_string()
    } else {
        plans
            .plans
            .iter()
            .map(|plan| format!("### {}\n\n{}\n", plan.label, plan.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    JUDGE_PROMPT
        .replace("{{BRIEF}}", brief.trim_end())
        .replace("{{PLANS}}", rendered.trim_end())
        .replace("{{JUDGE_TEMPLATE}}", judge_template.trim_end())
        .replace("{{PLAN_TEMPLATE}}", plan_template.trim_end())
}

pub fn refine_prompt(brief: &str, final_plan: &str, note: &str, plan_template: &str) -> String {
    let note = if note.trim().is_empty() {
        "Tighten the plan: fix gaps, inconsistencies and vague steps."
    } else {
        note.trim()
    };

    REFINE_PROMPT
        .replace("{{BRIEF}}", brief.trim_end())
        .replace("{{FINAL_PLAN}}", final_plan.trim_end())
        .replace("{{NOTE}}", note)
        .replace("{{PLAN_TEMPLATE}}", plan_template.trim_end())
}
