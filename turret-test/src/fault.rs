use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use turret_data::{DataError, Parameter};

/// Adapter or session call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateSession,
    Begin,
    Execute,
    Find,
    Commit,
    Rollback,
    End,
}

/// Error returned by an injected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedFault(pub FailPoint);

impl std::fmt::Display for InjectedFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "injected {:?} failure", self.0)
    }
}

impl std::error::Error for InjectedFault {}

type Matcher = Arc<dyn Fn(&Parameter) -> bool + Send + Sync>;

enum Trigger {
    Always,
    /// Only the n-th call (1-based) of the point fails.
    Nth(usize),
    Matching(Matcher),
}

struct Rule {
    point: FailPoint,
    trigger: Trigger,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    calls: HashMap<FailPoint, usize>,
}

/// Failure rules shared by an adapter and every session it creates.
#[derive(Clone, Default)]
pub struct Faults {
    state: Arc<Mutex<State>>,
}

impl Faults {
    fn push(&self, point: FailPoint, trigger: Trigger) -> &Self {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rules
            .push(Rule { point, trigger });
        self
    }

    /// Every call at `point` fails.
    pub fn fail(&self, point: FailPoint) -> &Self {
        self.push(point, Trigger::Always)
    }

    /// The `n`-th call at `point` (counting from 1) fails.
    pub fn fail_nth(&self, point: FailPoint, n: usize) -> &Self {
        self.push(point, Trigger::Nth(n))
    }

    /// Calls at `point` whose parameter satisfies `matcher` fail.
    pub fn fail_matching(
        &self,
        point: FailPoint,
        matcher: impl Fn(&Parameter) -> bool + Send + Sync + 'static,
    ) -> &Self {
        self.push(point, Trigger::Matching(Arc::new(matcher)))
    }

    /// Remove every rule and reset call counters.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.rules.clear();
        state.calls.clear();
    }

    pub(crate) fn check(
        &self,
        point: FailPoint,
        parameter: Option<&Parameter>,
    ) -> Result<(), DataError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let call = {
            let count = state.calls.entry(point).or_insert(0);
            *count += 1;
            *count
        };
        let triggered = state
            .rules
            .iter()
            .filter(|rule| rule.point == point)
            .any(|rule| match &rule.trigger {
                Trigger::Always => true,
                Trigger::Nth(n) => *n == call,
                Trigger::Matching(matcher) => parameter.is_some_and(|p| matcher(p)),
            });
        if triggered {
            tracing::debug!(?point, call, "Injecting failure");
            return Err(DataError::database(InjectedFault(point)));
        }
        Ok(())
    }
}
