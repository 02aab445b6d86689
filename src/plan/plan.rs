use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::core::{INITIAL_STATE, MigrationError, Result, State, StepRef};
use crate::migration::{MigrationBuilder, MigrationContext};
use crate::scope::Scope;

/// An edge in a plan: from one state to the next, carrying one migration
/// step.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: State,
    pub to: State,
    pub step: StepRef,
}

// The first authoring defect found while building a plan. Fluent calls
// never fail; the defect surfaces from validate() / execute().
#[derive(Debug, Clone)]
enum Defect {
    DuplicateTransition(State),
    SelfTransition(State),
    DisconnectedSplice { from: State, to: State },
}

impl Defect {
    fn to_error(&self) -> MigrationError {
        match self {
            Defect::DuplicateTransition(s) => MigrationError::DuplicateTransition(s.clone()),
            Defect::SelfTransition(s) => MigrationError::SelfTransition(s.clone()),
            Defect::DisconnectedSplice { from, to } => MigrationError::DisconnectedSplice {
                from: from.clone(),
                to: to.clone(),
            },
        }
    }
}

/// A named, validated directed chain of states connected by migration
/// steps.
///
/// Built fluently: [`from`](MigrationPlan::from) positions the chain head,
/// [`to`](MigrationPlan::to) appends a transition and moves the head
/// forward. A state maps to `None` while it has no outgoing transition;
/// exactly one such terminal state must remain once the plan is complete.
///
/// # Examples
///
/// ```
/// use rustmigrate::plan::MigrationPlan;
///
/// let plan = MigrationPlan::new("default")
///     .from("")
///     .to("aaa", "create-tables")
///     .to("bbb", "add-indexes");
///
/// assert_eq!(plan.validate().unwrap(), "bbb");
/// assert_eq!(plan.follow_path("", None).unwrap(), "bbb");
/// ```
pub struct MigrationPlan {
    name: String,
    product: Option<String>,
    transitions: HashMap<State, Option<Transition>>,
    current: State,
    defect: Option<Defect>,
}

impl MigrationPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            product: None,
            transitions: HashMap::new(),
            current: INITIAL_STATE.to_string(),
            defect: None,
        }
    }

    /// Tags the plan with a product name, forwarded to post-migration
    /// handlers so they can filter events.
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    /// Number of transitions in the plan.
    pub fn len(&self) -> usize {
        self.transitions.values().filter(|t| t.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Repositions the chain head, starting a new branch.
    pub fn from(mut self, state: impl Into<State>) -> Self {
        self.current = state.into();
        self
    }

    /// Appends a transition `current_head → state` carrying `step`, and
    /// moves the head to `state`.
    pub fn to(mut self, state: impl Into<State>, step: impl Into<StepRef>) -> Self {
        let to = state.into();
        self.add_transition(self.current.clone(), to.clone(), step.into());
        self.current = to;
        self
    }

    /// Chain splice: appends a transition `current_head → state` carrying
    /// `step`, then copies every transition on the existing forward path
    /// from `copy_from` to `copy_to` (exclusive of `copy_from`, inclusive of
    /// `copy_to`) and re-attaches the copied sub-chain under `state`.
    /// Copied intermediate states get generated names; the head ends up at
    /// the tail of the copied sub-chain, so the two branches share a common
    /// suffix of steps without re-declaring them.
    pub fn to_with_clone(
        mut self,
        state: impl Into<State>,
        step: impl Into<StepRef>,
        copy_from: impl Into<State>,
        copy_to: impl Into<State>,
    ) -> Self {
        let copy_from = copy_from.into();
        let copy_to = copy_to.into();

        // collect the steps on the existing path before mutating anything
        let copied = match self.collect_path_steps(&copy_from, &copy_to) {
            Ok(copied) => copied,
            Err(defect) => {
                self.record_defect(defect);
                return self;
            }
        };

        self = self.to(state, step);
        for step in copied {
            let clone_state = format!("clone-{}", Uuid::new_v4());
            self = self.to(clone_state, step);
        }
        self
    }

    // Steps attached to the transitions walking copy_from → copy_to.
    fn collect_path_steps(
        &self,
        copy_from: &str,
        copy_to: &str,
    ) -> std::result::Result<Vec<StepRef>, Defect> {
        let disconnected = || Defect::DisconnectedSplice {
            from: copy_from.to_string(),
            to: copy_to.to_string(),
        };

        let mut steps = Vec::new();
        let mut current = copy_from;
        let mut guard = 0;
        loop {
            let transition = match self.transitions.get(current) {
                Some(Some(t)) => t,
                _ => return Err(disconnected()),
            };
            steps.push(transition.step.clone());
            current = &transition.to;
            if current == copy_to {
                return Ok(steps);
            }
            guard += 1;
            if guard > self.transitions.len() {
                return Err(disconnected());
            }
        }
    }

    fn add_transition(&mut self, from: State, to: State, step: StepRef) {
        if from == to {
            self.record_defect(Defect::SelfTransition(from));
            return;
        }
        if let Some(Some(_)) = self.transitions.get(&from) {
            self.record_defect(Defect::DuplicateTransition(from));
            return;
        }
        self.transitions
            .insert(from.clone(), Some(Transition { from, to: to.clone(), step }));
        // the target is terminal until something chains onto it
        self.transitions.entry(to).or_insert(None);
    }

    fn record_defect(&mut self, defect: Defect) {
        if self.defect.is_none() {
            self.defect = Some(defect);
        }
    }

    fn check_defect(&self) -> Result<()> {
        match &self.defect {
            Some(defect) => Err(defect.to_error()),
            None => Ok(()),
        }
    }

    fn unknown_state(&self, state: &str) -> MigrationError {
        MigrationError::UnknownState {
            plan: self.name.clone(),
            state: state.to_string(),
        }
    }

    /// Validates the whole plan: no authoring defect, no cycle, exactly one
    /// terminal state. Returns the terminal state.
    pub fn validate(&self) -> Result<State> {
        self.check_defect()?;

        // out-degree is at most one, so a walk longer than the transition
        // count must have revisited a state
        for start in self.transitions.keys() {
            let mut visited = HashSet::new();
            let mut current = start.as_str();
            while let Some(Some(t)) = self.transitions.get(current) {
                if !visited.insert(current) {
                    return Err(MigrationError::Cycle(current.to_string()));
                }
                current = &t.to;
            }
        }

        let terminals: Vec<State> = self
            .transitions
            .iter()
            .filter(|(_, t)| t.is_none())
            .map(|(s, _)| s.clone())
            .collect();
        match terminals.as_slice() {
            [terminal] => Ok(terminal.clone()),
            _ => {
                let mut terminals = terminals;
                terminals.sort();
                Err(MigrationError::MultipleHeads(terminals))
            }
        }
    }

    /// Walks transitions starting at `from`. Stops at `to` when given,
    /// otherwise at the terminal state. Used for diagnostics and tests.
    pub fn follow_path(&self, from: &str, to: Option<&str>) -> Result<State> {
        self.check_defect()?;
        if !self.transitions.contains_key(from) {
            return Err(self.unknown_state(from));
        }

        let mut current = from;
        let mut guard = 0;
        loop {
            if to == Some(current) {
                return Ok(current.to_string());
            }
            match self.transitions.get(current) {
                Some(Some(t)) => current = &t.to,
                _ => {
                    return match to {
                        // the bound was never reached before the terminal
                        Some(bound) => Err(self.unknown_state(bound)),
                        None => Ok(current.to_string()),
                    };
                }
            }
            guard += 1;
            if guard > self.transitions.len() {
                return Err(MigrationError::Cycle(current.to_string()));
            }
        }
    }

    /// Executes the path from `source_state` to the terminal state inside
    /// the given scope, building each step through `builder`. Stops at the
    /// first failing step; nothing after it runs.
    pub fn execute(
        &self,
        scope: &Scope,
        source_state: &str,
        builder: &dyn MigrationBuilder,
    ) -> Result<State> {
        self.check_defect()?;

        let mut next = self
            .transitions
            .get(source_state)
            .ok_or_else(|| self.unknown_state(source_state))?;

        let mut ctx = MigrationContext::new(scope, &self.name);
        let mut current = source_state;
        let mut guard = 0;
        while let Some(transition) = next {
            tracing::info!(
                plan = %self.name,
                from = %transition.from,
                to = %transition.to,
                step = %transition.step,
                "executing migration step"
            );
            let migration = builder.build(&transition.step, &ctx)?;
            migration.migrate(&mut ctx)?;
            if ctx.has_open_expression() {
                return Err(MigrationError::IncompleteExpression(
                    transition.step.to_string(),
                ));
            }
            ctx.record_step();

            current = &transition.to;
            next = self
                .transitions
                .get(current)
                .ok_or_else(|| self.unknown_state(current))?;
            guard += 1;
            if guard > self.transitions.len() {
                return Err(MigrationError::Cycle(current.to_string()));
            }
        }

        tracing::info!(
            plan = %self.name,
            source = %source_state,
            terminal = %current,
            steps = ctx.steps_executed(),
            "plan execution finished"
        );
        Ok(current.to_string())
    }
}
