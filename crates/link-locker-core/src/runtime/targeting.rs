// crates/link-locker-core/src/runtime/targeting.rs
// ============================================================================
// Module: Link Locker Targeting Resolver
// Description: Filters a locker's candidate tasks for one visitor.
// Purpose: Decide which tasks a visitor may see, with per-task diagnostics.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Targeting is a pure function of the visitor, the locker, the candidate
//! tasks, and the override for the visitor's `(device, country)` slot. Checks
//! short-circuit in a fixed order so the first failing rule is reported.
//! Missing task fields always default to "permit".

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::DeviceTargetingOverride;
use crate::core::Locker;
use crate::core::Task;
use crate::core::TaskId;
use crate::core::TaskStatus;
use crate::core::VisitorContext;

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// First rule a task failed for a visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Task is soft-disabled.
    Inactive,
    /// Locker does not accept the task category.
    TaskTypeNotAccepted,
    /// Visitor browser is excluded by the task.
    BrowserExcluded,
    /// Task targets other device classes.
    DeviceNotTargeted,
    /// Task targets other tiers.
    TierNotTargeted,
    /// The visitor's slot override selects a different task.
    OverrideSelectsOtherTask,
}

impl ExclusionReason {
    /// Returns the stable snake_case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::TaskTypeNotAccepted => "task_type_not_accepted",
            Self::BrowserExcluded => "browser_excluded",
            Self::DeviceNotTargeted => "device_not_targeted",
            Self::TierNotTargeted => "tier_not_targeted",
            Self::OverrideSelectsOtherTask => "override_selects_other_task",
        }
    }
}

/// Targeting verdict for one candidate task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskVerdict {
    /// Candidate task.
    pub task_id: TaskId,
    /// First failed rule, if any.
    pub excluded: Option<ExclusionReason>,
}

/// Targeting result: the surviving tasks in input order plus every verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetingReport {
    /// Tasks the visitor may complete.
    pub included: Vec<Task>,
    /// Per-task verdicts in input order.
    pub verdicts: Vec<TaskVerdict>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates one task for a visitor.
///
/// # Errors
///
/// Returns the first [`ExclusionReason`] the task fails.
pub fn evaluate_task(
    task: &Task,
    visitor: &VisitorContext,
    locker: &Locker,
    slot_override: Option<&DeviceTargetingOverride>,
) -> Result<(), ExclusionReason> {
    if task.status != TaskStatus::Active {
        return Err(ExclusionReason::Inactive);
    }
    if !locker.accepts(&task.task_type) {
        return Err(ExclusionReason::TaskTypeNotAccepted);
    }
    if task.excluded_browsers.contains(&visitor.browser) {
        return Err(ExclusionReason::BrowserExcluded);
    }
    if !task.target_devices.is_empty() && !task.target_devices.contains(&visitor.device) {
        return Err(ExclusionReason::DeviceNotTargeted);
    }
    if !task.targets_tier(visitor.tier) {
        return Err(ExclusionReason::TierNotTargeted);
    }
    if let Some(slot) = slot_override
        && !slot.applies_to(&task.task_id)
    {
        return Err(ExclusionReason::OverrideSelectsOtherTask);
    }
    Ok(())
}

/// Filters candidate tasks for a visitor, preserving input order.
#[must_use]
pub fn resolve_targeting(
    tasks: &[Task],
    visitor: &VisitorContext,
    locker: &Locker,
    slot_override: Option<&DeviceTargetingOverride>,
) -> TargetingReport {
    let mut included = Vec::new();
    let mut verdicts = Vec::with_capacity(tasks.len());
    for task in tasks {
        let excluded = evaluate_task(task, visitor, locker, slot_override).err();
        if excluded.is_none() {
            included.push(task.clone());
        }
        verdicts.push(TaskVerdict {
            task_id: task.task_id.clone(),
            excluded,
        });
    }
    TargetingReport { included, verdicts }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
