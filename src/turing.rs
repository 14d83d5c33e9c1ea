//! Turing machine simulator
//!
//! A single-tape machine with a sparse, unbounded tape. The specification
//! (states, alphabets, transition function) is fixed at construction; `reset`,
//! `step` and `run` only touch runtime state, so one machine can be run on many
//! inputs.
//!
//! A missing transition halts the machine without error. Entering an accept or
//! reject state also halts it.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default blank symbol
pub const BLANK: char = '_';

/// Default step budget for `run`
pub const DEFAULT_MAX_STEPS: usize = 1000;

/// Head movement after a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    L,
    R,
    N,
}

impl Direction {
    pub fn offset(&self) -> i64 {
        match self {
            Direction::L => -1,
            Direction::R => 1,
            Direction::N => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::L => "L",
            Direction::R => "R",
            Direction::N => "N",
        }
    }
}

/// Right-hand side of a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub next: String,
    pub write: char,
    pub dir: Direction,
}

impl Transition {
    pub fn new(next: impl Into<String>, write: char, dir: Direction) -> Self {
        Self {
            next: next.into(),
            write,
            dir,
        }
    }
}

/// Transition table keyed by `(state, read symbol)`
pub type TransitionTable = BTreeMap<(String, char), Transition>;

/// Static part of a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSpec {
    #[serde(rename = "Q")]
    pub states: BTreeSet<String>,
    #[serde(rename = "Sigma")]
    pub input_alphabet: BTreeSet<char>,
    #[serde(rename = "Gamma")]
    pub tape_alphabet: BTreeSet<char>,
    pub blank: char,
    #[serde(rename = "q0")]
    pub start_state: String,
    #[serde(rename = "accept")]
    pub accept_states: BTreeSet<String>,
    #[serde(rename = "reject", default)]
    pub reject_states: BTreeSet<String>,
    #[serde(rename = "delta", with = "delta_format")]
    pub transitions: TransitionTable,
}

impl MachineSpec {
    /// Spec over the binary alphabet `{0, 1}` with blank `_`
    pub fn binary(
        states: impl IntoIterator<Item = String>,
        transitions: TransitionTable,
        start_state: impl Into<String>,
        accept_states: impl IntoIterator<Item = String>,
        reject_states: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            states: states.into_iter().collect(),
            input_alphabet: ['0', '1'].into_iter().collect(),
            tape_alphabet: ['0', '1', BLANK].into_iter().collect(),
            blank: BLANK,
            start_state: start_state.into(),
            accept_states: accept_states.into_iter().collect(),
            reject_states: reject_states.into_iter().collect(),
            transitions,
        }
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        if !self.states.contains(&self.start_state) {
            return Err(AnalysisError::MachineError(format!(
                "start state {} is not in Q",
                self.start_state
            )));
        }
        for ((state, _), transition) in &self.transitions {
            for name in [state, &transition.next] {
                if !self.states.contains(name) {
                    return Err(AnalysisError::MachineError(format!(
                        "transition references unknown state {name}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// `delta` is written as `{"state,symbol": {next, write, dir}}`
mod delta_format {
    use super::{Transition, TransitionTable};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(table: &TransitionTable, serializer: S) -> Result<S::Ok, S::Error> {
        let keyed: BTreeMap<String, &Transition> = table
            .iter()
            .map(|((state, symbol), t)| (format!("{state},{symbol}"), t))
            .collect();
        keyed.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TransitionTable, D::Error> {
        let keyed = BTreeMap::<String, Transition>::deserialize(deserializer)?;
        let mut table = TransitionTable::new();
        for (key, transition) in keyed {
            let (state, symbol) = key
                .split_once(',')
                .ok_or_else(|| D::Error::custom(format!("delta key {key:?} has no comma")))?;
            let mut chars = symbol.chars();
            let sym = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(D::Error::custom(format!(
                        "delta key {key:?} must name exactly one symbol"
                    )))
                }
            };
            table.insert((state.to_string(), sym), transition);
        }
        Ok(table)
    }
}

/// Machine state after a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    pub state: String,
    pub head: i64,
    /// Symbol under the head after the step
    pub symbol: char,
}

/// Full machine state, suitable for persisting a run in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub spec: MachineSpec,
    pub tape: BTreeMap<i64, char>,
    pub head: i64,
    pub state: String,
    pub halted: bool,
}

/// Turing machine with runtime state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuringMachine {
    spec: MachineSpec,
    tape: BTreeMap<i64, char>,
    head: i64,
    state: String,
    halted: bool,
}

impl TuringMachine {
    pub fn new(spec: MachineSpec) -> Result<Self, AnalysisError> {
        spec.validate()?;
        Ok(Self::idle(spec))
    }

    fn idle(spec: MachineSpec) -> Self {
        Self {
            state: spec.start_state.clone(),
            spec,
            tape: BTreeMap::new(),
            head: 0,
            halted: false,
        }
    }

    pub fn spec(&self) -> &MachineSpec {
        &self.spec
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn head(&self) -> i64 {
        self.head
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_accepted(&self) -> bool {
        self.halted && self.spec.accept_states.contains(&self.state)
    }

    pub fn is_rejected(&self) -> bool {
        self.halted && self.spec.reject_states.contains(&self.state)
    }

    /// Load `input` onto a fresh tape starting at position 0 and rewind
    pub fn reset(&mut self, input: &str) {
        let blank = self.spec.blank;
        self.tape = input
            .chars()
            .enumerate()
            .filter(|&(_, c)| c != blank)
            .map(|(i, c)| (i as i64, c))
            .collect();
        self.head = 0;
        self.state = self.spec.start_state.clone();
        self.halted = false;
    }

    fn read(&self) -> char {
        self.tape.get(&self.head).copied().unwrap_or(self.spec.blank)
    }

    fn write(&mut self, symbol: char) {
        if symbol == self.spec.blank {
            self.tape.remove(&self.head);
        } else {
            self.tape.insert(self.head, symbol);
        }
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            state: self.state.clone(),
            head: self.head,
            symbol: self.read(),
        }
    }

    /// Execute one transition. A halted machine is left untouched.
    pub fn step(&mut self) -> StepInfo {
        if self.halted {
            return self.info();
        }

        let key = (self.state.clone(), self.read());
        let Some(transition) = self.spec.transitions.get(&key).cloned() else {
            self.halted = true;
            return self.info();
        };

        self.write(transition.write);
        self.head += transition.dir.offset();
        self.state = transition.next;

        if self.spec.accept_states.contains(&self.state)
            || self.spec.reject_states.contains(&self.state)
        {
            self.halted = true;
        }

        self.info()
    }

    /// Step until halted or `max_steps` transitions were attempted.
    ///
    /// Returns the final state and the number of steps taken. Running out of
    /// budget is not an error; check `is_halted` afterwards.
    pub fn run(&mut self, max_steps: usize) -> (String, usize) {
        let mut steps = 0;
        while !self.halted && steps < max_steps {
            self.step();
            steps += 1;
        }
        tracing::trace!(state = %self.state, steps, halted = self.halted, "machine run finished");
        (self.state.clone(), steps)
    }

    /// Run `input` from a fresh reset and report whether it was accepted
    pub fn accepts(&mut self, input: &str, max_steps: usize) -> bool {
        self.reset(input);
        self.run(max_steps);
        self.is_accepted()
    }

    /// Non-blank tape contents within `window` cells of the head.
    ///
    /// Returns the window text and the head offset inside it.
    pub fn tape_window(&self, window: i64) -> (String, usize) {
        let (Some(&min_pos), Some(&max_pos)) = (self.tape.keys().next(), self.tape.keys().next_back())
        else {
            return (self.spec.blank.to_string(), 0);
        };

        let left = min_pos.max(self.head.saturating_sub(window)).min(self.head);
        let right = max_pos.min(self.head.saturating_add(window)).max(self.head);
        let text: String = (left..=right)
            .map(|i| self.tape.get(&i).copied().unwrap_or(self.spec.blank))
            .collect();
        (text, (self.head - left) as usize)
    }

    /// Graphviz rendering with one edge per state pair, labels merged
    pub fn to_dot(&self) -> String {
        let mut lines = vec![
            "digraph turing {".to_string(),
            "  rankdir=LR;".to_string(),
            "  node [shape = circle];".to_string(),
        ];
        for q in &self.spec.states {
            let shape = if self.spec.accept_states.contains(q) {
                "doublecircle"
            } else {
                "circle"
            };
            lines.push(format!("  \"{q}\" [shape={shape}];"));
        }

        let mut edges: BTreeMap<(&str, &str), Vec<String>> = BTreeMap::new();
        for ((state, read), t) in &self.spec.transitions {
            edges
                .entry((state.as_str(), t.next.as_str()))
                .or_default()
                .push(format!("{read}→{},{}", t.write, t.dir.as_str()));
        }
        for ((from, to), labels) in edges {
            lines.push(format!("  \"{from}\" -> \"{to}\" [label=\"{}\"];", labels.join("; ")));
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    pub fn to_snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            spec: self.spec.clone(),
            tape: self.tape.clone(),
            head: self.head,
            state: self.state.clone(),
            halted: self.halted,
        }
    }

    pub fn from_snapshot(snapshot: MachineSnapshot) -> Result<Self, AnalysisError> {
        let mut machine = Self::new(snapshot.spec)?;
        if !machine.spec.states.contains(&snapshot.state) {
            return Err(AnalysisError::MachineError(format!(
                "snapshot state {} is not in Q",
                snapshot.state
            )));
        }
        machine.tape = snapshot.tape;
        machine.head = snapshot.head;
        machine.state = snapshot.state;
        machine.halted = snapshot.halted;
        Ok(machine)
    }

    /// Load a machine from its spec JSON; extra keys such as `_metadata` are ignored
    pub fn from_spec_json(json: &str) -> Result<Self, AnalysisError> {
        let spec: MachineSpec = serde_json::from_str(json)?;
        Self::new(spec)
    }
}

fn binary_transitions(
    entries: impl IntoIterator<Item = (&'static str, char, &'static str, char, Direction)>,
) -> TransitionTable {
    entries
        .into_iter()
        .map(|(from, read, to, write, dir)| ((from.to_string(), read), Transition::new(to, write, dir)))
        .collect()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Machine that scans right to the first blank and accepts
pub fn scan_machine() -> TuringMachine {
    use Direction::{N, R};
    let transitions = binary_transitions([
        ("q_start", '0', "q_scan", '0', R),
        ("q_start", '1', "q_scan", '1', R),
        ("q_start", BLANK, "q_accept", BLANK, N),
        ("q_scan", '0', "q_scan", '0', R),
        ("q_scan", '1', "q_scan", '1', R),
        ("q_scan", BLANK, "q_accept", BLANK, N),
    ]);
    let spec = MachineSpec::binary(
        names(&["q_start", "q_scan", "q_accept", "q_reject"]),
        transitions,
        "q_start",
        names(&["q_accept"]),
        names(&["q_reject"]),
    );
    TuringMachine::idle(spec)
}

/// Machine that accepts on the first `1` and rejects at the first blank
pub fn contains_one_machine() -> TuringMachine {
    use Direction::{N, R};
    let transitions = binary_transitions([
        ("q_start", '0', "q_scan", '0', R),
        ("q_start", '1', "q_accept", '1', N),
        ("q_start", BLANK, "q_reject", BLANK, N),
        ("q_scan", '0', "q_scan", '0', R),
        ("q_scan", '1', "q_accept", '1', N),
        ("q_scan", BLANK, "q_reject", BLANK, N),
    ]);
    let spec = MachineSpec::binary(
        names(&["q_start", "q_scan", "q_accept", "q_reject"]),
        transitions,
        "q_start",
        names(&["q_accept"]),
        names(&["q_reject"]),
    );
    TuringMachine::idle(spec)
}

/// Machine deciding majority over a tape of exactly `n` binary symbols.
///
/// State `q_k` means `k` ones were read so far. At the first blank the machine
/// accepts iff `k > n / 2`, i.e. strictly more than half the symbols are ones.
/// The state count is linear in `n`, so this is a finite automaton in disguise.
pub fn majority_machine(n: usize) -> Result<TuringMachine, AnalysisError> {
    if n == 0 {
        return Err(AnalysisError::InvalidConfig(
            "majority machine tape length must be positive".to_string(),
        ));
    }

    let count_state = |k: usize| format!("q_{k}");
    let mut states: Vec<String> = (0..=n).map(count_state).collect();
    states.push("q_accept".to_string());
    states.push("q_reject".to_string());

    let mut transitions = TransitionTable::new();
    for k in 0..=n {
        transitions.insert(
            (count_state(k), '0'),
            Transition::new(count_state(k), '0', Direction::R),
        );
        transitions.insert(
            (count_state(k), '1'),
            Transition::new(count_state((k + 1).min(n)), '1', Direction::R),
        );
        let verdict = if k > n / 2 { "q_accept" } else { "q_reject" };
        transitions.insert(
            (count_state(k), BLANK),
            Transition::new(verdict, BLANK, Direction::N),
        );
    }

    let spec = MachineSpec::binary(
        states,
        transitions,
        count_state(0),
        names(&["q_accept"]),
        names(&["q_reject"]),
    );
    TuringMachine::new(spec)
}
