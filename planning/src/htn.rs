//! Hierarchical planning: high-level actions with a resource ledger and
//! job-group ordering, plus a breadth-first refinement search.

use crate::kb::FactBase;
use crate::strips::{ActionSchema, ExecError};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Named resource quantities, e.g. `{"EngineHoists": 1, "LugNuts": 500}`.
pub type Resources = BTreeMap<String, i64>;

/// Refinement search gives up after this many frontier expansions.
const EXPANSION_LIMIT: usize = 10_000;

/// Expected failures of scheduled execution. All are fatal to the offending
/// `act` call and leave the execution state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("task '{0}' not found")]
    UnknownTask(String),
    #[error("not enough '{resource}' to execute '{task}'")]
    InsufficientResource { task: String, resource: String },
    #[error("cannot execute '{task}' before its prerequisite '{prerequisite}'")]
    OutOfOrder { task: String, prerequisite: String },
    #[error(transparent)]
    Precondition(#[from] ExecError),
}

/// A high-level action: an action schema with a duration and a resource
/// ledger. `uses` quantities must be available but are returned after the
/// task; `consumes` quantities are decremented for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hla {
    pub schema: ActionSchema,
    pub duration: u32,
    pub uses: Resources,
    pub consumes: Resources,
}

impl Hla {
    pub fn new(schema: ActionSchema) -> Hla {
        Hla {
            schema,
            duration: 0,
            uses: Resources::new(),
            consumes: Resources::new(),
        }
    }

    pub fn with_duration(mut self, duration: u32) -> Hla {
        self.duration = duration;
        self
    }

    pub fn using(mut self, resource: &str, amount: i64) -> Hla {
        self.uses.insert(resource.to_string(), amount);
        self
    }

    pub fn consuming(mut self, resource: &str, amount: i64) -> Hla {
        self.consumes.insert(resource.to_string(), amount);
        self
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// The first resource of `wanted` the ledger cannot cover, if any.
    fn shortfall(ledger: &Resources, wanted: &Resources) -> Option<String> {
        wanted
            .iter()
            .find(|(resource, amount)| ledger.get(resource.as_str()).is_none_or(|have| have < *amount))
            .map(|(resource, _)| resource.to_string())
    }
}

/// A resource-constrained scheduling problem: tasks, goal conjunction, job
/// groups (names in required execution order) and the initial ledger.
#[derive(Debug, Clone)]
pub struct SchedulingProblem {
    pub init: Vec<crate::logic::Literal>,
    pub tasks: Vec<Hla>,
    pub goals: Vec<crate::logic::Literal>,
    pub job_groups: Vec<Vec<String>>,
    pub resources: Resources,
}

impl SchedulingProblem {
    pub fn task(&self, name: &str) -> Option<&Hla> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    pub fn execution(&self) -> Execution<'_> {
        Execution {
            problem: self,
            kb: self.init.iter().cloned().collect(),
            resources: self.resources.clone(),
            completed: BTreeSet::new(),
        }
    }
}

/// One run of a scheduling problem: the evolving fact base, the remaining
/// resource ledger and the set of completed tasks.
#[derive(Debug, Clone)]
pub struct Execution<'a> {
    problem: &'a SchedulingProblem,
    kb: FactBase,
    resources: Resources,
    completed: BTreeSet<String>,
}

impl Execution<'_> {
    /// Executes one of the problem's tasks by name.
    pub fn act(&mut self, name: &str) -> Result<(), ScheduleError> {
        let task = self
            .problem
            .task(name)
            .ok_or_else(|| ScheduleError::UnknownTask(name.to_string()))?
            .clone();
        self.perform(&task)
    }

    /// Executes a task: resource and job-order checks, then the schema's
    /// effects, then ledger and completion updates. Checks run before any
    /// mutation, so a failed call leaves the execution unchanged.
    pub fn perform(&mut self, task: &Hla) -> Result<(), ScheduleError> {
        for wanted in [&task.uses, &task.consumes] {
            if let Some(resource) = Hla::shortfall(&self.resources, wanted) {
                return Err(ScheduleError::InsufficientResource {
                    task: task.name().to_string(),
                    resource,
                });
            }
        }
        if let Some(prerequisite) = self.blocking_prerequisite(task.name()) {
            return Err(ScheduleError::OutOfOrder {
                task: task.name().to_string(),
                prerequisite,
            });
        }
        let args = task.schema.params().to_vec();
        task.schema.apply(&mut self.kb, &args)?;
        for (resource, amount) in &task.consumes {
            *self.resources.get_mut(resource).expect("checked above") -= amount;
        }
        self.completed.insert(task.name().to_string());
        tracing::debug!("completed task {}", task.name());
        Ok(())
    }

    /// The first not-yet-completed task ordered before `name` in its job
    /// group, if any. Tasks outside every group are unconstrained.
    fn blocking_prerequisite(&self, name: &str) -> Option<String> {
        for group in &self.problem.job_groups {
            if let Some(pos) = group.iter().position(|n| n == name) {
                return group[..pos].iter().find(|n| !self.completed.contains(*n)).cloned();
            }
        }
        None
    }

    pub fn goal_holds(&self) -> bool {
        self.kb.ask_all(&self.problem.goals)
    }

    pub fn kb(&self) -> &FactBase {
        &self.kb
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }
}

/// One way of refining a named task into a sequence of lower-level tasks. An
/// empty step list marks the task as primitive.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub task: String,
    pub steps: Vec<Hla>,
}

/// All known refinements, keyed by task name. A task may have several
/// entries; the search tries them in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RefinementLibrary {
    entries: Vec<Refinement>,
}

impl RefinementLibrary {
    pub fn new() -> RefinementLibrary {
        RefinementLibrary::default()
    }

    pub fn add(mut self, task: &str, steps: Vec<Hla>) -> RefinementLibrary {
        self.entries.push(Refinement {
            task: task.to_string(),
            steps,
        });
        self
    }

    pub fn refinements_of<'a>(&'a self, task: &'a str) -> impl Iterator<Item = &'a Refinement> {
        self.entries.iter().filter(move |r| r.task == task)
    }

    /// A task is primitive when no refinement decomposes it further.
    pub fn is_primitive(&self, task: &str) -> bool {
        self.refinements_of(task).all(|r| r.steps.is_empty())
    }
}

/// Breadth-first search over task refinements: repeatedly replaces the first
/// non-primitive task of a candidate plan with each of its refinements, and
/// returns the first all-primitive plan that executes to the goal.
pub fn hierarchical_search(problem: &SchedulingProblem, library: &RefinementLibrary) -> Option<Vec<Hla>> {
    let _span = tracing::span!(tracing::Level::TRACE, "htn").entered();
    let mut frontier: VecDeque<Vec<Hla>> = VecDeque::new();
    frontier.push_back(problem.tasks.clone());
    for _ in 0..EXPANSION_LIMIT {
        let plan = frontier.pop_front()?;
        match plan.iter().position(|t| !library.is_primitive(t.name())) {
            None => {
                let mut run = problem.execution();
                if plan.iter().all(|t| run.perform(t).is_ok()) && run.goal_holds() {
                    tracing::debug!("refinement search found a {}-step plan", plan.len());
                    return Some(plan);
                }
            }
            Some(i) => {
                // State reached by the primitive prefix; refinements whose
                // first step is inapplicable there are pruned.
                let mut run = problem.execution();
                if !plan[..i].iter().all(|t| run.perform(t).is_ok()) {
                    continue;
                }
                for refinement in library.refinements_of(plan[i].name()) {
                    if refinement.steps.is_empty() {
                        continue;
                    }
                    let first = &refinement.steps[0];
                    if !first.schema.check_precond(run.kb(), &first.schema.params().to_vec()) {
                        continue;
                    }
                    let mut refined = plan.clone();
                    refined.splice(i..=i, refinement.steps.iter().cloned());
                    frontier.push_back(refined);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::{go_to_sfo, job_shop_problem};

    #[test]
    fn job_shop_completes_group_by_group() {
        let problem = job_shop_problem();
        let mut run = problem.execution();
        assert!(!run.goal_holds());
        for name in ["AddEngine2", "AddWheels2", "Inspect2", "AddEngine1", "AddWheels1"] {
            run.act(name).unwrap();
        }
        assert!(!run.goal_holds());
        run.act("Inspect1").unwrap();
        assert!(run.goal_holds());
        // wheels consumed 40 lug nuts, the used resources are back
        assert_eq!(run.resources()["LugNuts"], 460);
        assert_eq!(run.resources()["EngineHoists"], 1);
    }

    #[test]
    fn out_of_order_jobs_are_rejected() {
        let problem = job_shop_problem();
        let mut run = problem.execution();
        let err = run.act("Inspect1").unwrap_err();
        assert_eq!(
            err,
            ScheduleError::OutOfOrder {
                task: "Inspect1".to_string(),
                prerequisite: "AddEngine1".to_string(),
            }
        );
        // the failed call left nothing behind
        assert!(run.act("AddEngine1").is_ok());
    }

    #[test]
    fn missing_resources_are_rejected() {
        let mut problem = job_shop_problem();
        problem.resources.insert("LugNuts".to_string(), 10);
        let mut run = problem.execution();
        run.act("AddEngine1").unwrap();
        let err = run.act("AddWheels1").unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InsufficientResource {
                task: "AddWheels1".to_string(),
                resource: "LugNuts".to_string(),
            }
        );

        let mut problem = job_shop_problem();
        problem.resources.remove("EngineHoists");
        let err = problem.execution().act("AddEngine1").unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InsufficientResource {
                task: "AddEngine1".to_string(),
                resource: "EngineHoists".to_string(),
            }
        );
    }

    #[test]
    fn repeating_a_task_fails_its_precondition() {
        let problem = job_shop_problem();
        let mut run = problem.execution();
        run.act("AddEngine1").unwrap();
        let err = run.act("AddEngine1").unwrap_err();
        assert!(matches!(err, ScheduleError::Precondition(_)));
    }

    #[test]
    fn unknown_tasks_are_rejected() {
        let problem = job_shop_problem();
        let err = problem.execution().act("PaintCar").unwrap_err();
        assert_eq!(err, ScheduleError::UnknownTask("PaintCar".to_string()));
    }

    #[test]
    fn refinement_search_drives_to_the_airport() {
        let (problem, library) = go_to_sfo();
        let plan = hierarchical_search(&problem, &library).expect("a refinement reaches SFO");
        let names: Vec<&str> = plan.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Drive", "Shuttle"]);
    }

    #[test]
    fn refinement_search_reports_dead_libraries() {
        let (problem, _) = go_to_sfo();
        // `Go` is marked primitive but its schema has no effects, so the
        // only candidate plan never reaches the goal.
        let library = RefinementLibrary::new().add("Go", vec![]);
        assert!(hierarchical_search(&problem, &library).is_none());
    }
}
