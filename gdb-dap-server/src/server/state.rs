//! Session-side bookkeeping: threads, opaque handles, the pause/resume
//! bracket, and the configuration phase.
//!
//! The transitions here are pure (no I/O): they mutate state and tell the
//! caller what to send, which keeps the invariants testable without a GDB
//! process on the other end.

use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;

use crate::server::variables::{VarManager, VariableScope};

#[derive(Clone, Debug)]
pub struct ThreadInfo {
    pub id: i64,
    pub name: String,
    pub running: bool,
    /// Token of the MI command that last moved this thread from stopped to
    /// running; used to retroactively stop it if that command later fails.
    pub last_run_token: Option<u64>,
}

/// Opaque stack-frame handle contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReference {
    pub thread_id: i64,
    pub frame_level: i64,
}

/// Opaque variable-container handle contents.
#[derive(Clone, Debug, PartialEq)]
pub enum VariableReference {
    /// The locals of one frame.
    Frame {
        frame: FrameReference,
        scope: VariableScope,
    },
    /// The register list of one frame.
    Registers { frame: FrameReference },
    /// The globals pseudo-scope.
    Globals,
    /// The children of one varobj.
    Object {
        scope: VariableScope,
        varname: String,
    },
}

/// A generational arena for handles given out to the IDE.
///
/// Handles are cleared on every stopped/continued event; the generation
/// stamped into each handle makes stale ones from before the last stop
/// fail cleanly instead of resolving to the wrong entry.
#[derive(Debug)]
pub struct HandleArena<T> {
    generation: i64,
    entries: Vec<T>,
}

const HANDLE_INDEX_BITS: i64 = 16;
const HANDLE_INDEX_MASK: i64 = (1 << HANDLE_INDEX_BITS) - 1;
const HANDLE_GENERATION_MASK: i64 = 0x3fff;

impl<T> HandleArena<T> {
    pub fn new() -> Self {
        HandleArena {
            generation: 0,
            entries: Vec::new(),
        }
    }

    pub fn create(&mut self, value: T) -> i64 {
        self.entries.push(value);
        let index = self.entries.len() as i64;
        ((self.generation & HANDLE_GENERATION_MASK) << HANDLE_INDEX_BITS) | index
    }

    pub fn get(&self, handle: i64) -> Option<&T> {
        let generation = (handle >> HANDLE_INDEX_BITS) & HANDLE_GENERATION_MASK;
        if generation != self.generation & HANDLE_GENERATION_MASK {
            return None;
        }
        let index = handle & HANDLE_INDEX_MASK;
        self.entries.get(index as usize - 1)
    }

    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.entries.clear();
    }
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The interval between the `initialized` event and `configurationDone`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfiguringState {
    Initial,
    /// Configuration phase with the target running.
    Configuring,
    /// Configuration phase holding a pause on the target.
    ConfiguringPaused,
    /// `configurationDone` received; the next resume starts the inferior.
    Finishing,
    Done,
}

/// Which breakpoint family a `set*Breakpoints` request belongs to; used for
/// the first-empty short-circuit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BreakpointRequestKind {
    Source,
    Function,
    Instruction,
    Data,
}

/// Which threads an MI resume command applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumeScope {
    All,
    Thread(i64),
}

/// What `*running` reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunningSpec {
    All,
    Thread(i64),
}

/// The parsed, relevant parts of a `*stopped` record.
#[derive(Clone, Debug, Default)]
pub struct StopInfo {
    pub thread_id: Option<i64>,
    pub all_threads: bool,
    pub reason: Option<String>,
    pub bkptno: Option<i64>,
    pub signal_name: Option<String>,
    pub exit_code: Option<i64>,
}

/// What the session should do about a `*stopped` record.
#[derive(Debug, PartialEq)]
pub enum StoppedOutcome {
    /// A pause this adapter requested itself; do not tell the client.
    Silent,
    /// A logpoint fired: emit its message and resume.
    Logpoint { message: String, thread_id: i64 },
    /// Emit a stopped event.
    Event {
        reason: String,
        thread_id: i64,
        all_threads: bool,
    },
    /// The inferior is gone.
    Terminated,
}

/// Result of opening a pause bracket.
#[derive(Debug)]
pub enum PauseAction {
    /// The target is already stopped on its own; the bracket is a no-op.
    NotNeeded,
    /// A pause is already held; this bracket shares it.
    Joined,
    /// A pause is in flight; wait for the stop.
    Wait(oneshot::Receiver<()>),
    /// This bracket is first: interrupt the target, then wait.
    Interrupt(oneshot::Receiver<()>),
}

impl PauseAction {
    /// Whether this bracket took a reference on the pause count.
    pub fn counted(&self) -> bool {
        !matches!(self, PauseAction::NotNeeded)
    }
}

/// Result of closing a pause bracket.
#[derive(Debug, PartialEq, Eq)]
pub enum ResumeAction {
    /// Other brackets still hold the pause.
    None,
    /// Resume the target.
    Continue,
    /// This was the configuration phase's hold: start (or resume) the
    /// inferior for real.
    InitialResume,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuedEvent {
    pub thread_id: i64,
    pub all_threads: bool,
}

/// All mutable session state, owned behind one lock.
pub struct SessionState {
    pub threads: Vec<ThreadInfo>,
    /// A thread was created without a name; refresh on the next
    /// opportunity.
    pub missing_thread_names: bool,
    pub frame_handles: HandleArena<FrameReference>,
    pub variable_handles: HandleArena<VariableReference>,
    pub varobjs: VarManager,
    pub configuring: ConfiguringState,
    pub is_attach: bool,
    pub remote: bool,
    pub non_stop: bool,
    /// MI numbers of breakpoints created by `setFunctionBreakpoints`.
    pub function_breakpoints: HashSet<i64>,
    /// MI number → log message template.
    pub logpoints: HashMap<i64, String>,
    /// Families of breakpoint requests seen so far (first-empty
    /// short-circuit).
    pub seen_breakpoint_requests: HashSet<BreakpointRequestKind>,
    pub register_names: Option<Vec<String>>,
    /// Console stream capture buffer for the executeCommand tunnel.
    pub console_capture: Option<String>,
    pub exited: bool,

    pause_count: u32,
    /// An interrupt was sent but its stop has not been observed yet.
    pause_pending: bool,
    pause_waiters: Vec<oneshot::Sender<()>>,
    resume_tokens: HashMap<u64, ResumeScope>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            threads: Vec::new(),
            missing_thread_names: false,
            frame_handles: HandleArena::new(),
            variable_handles: HandleArena::new(),
            varobjs: VarManager::new(),
            configuring: ConfiguringState::Initial,
            is_attach: false,
            remote: false,
            non_stop: false,
            function_breakpoints: HashSet::new(),
            logpoints: HashMap::new(),
            seen_breakpoint_requests: HashSet::new(),
            register_names: None,
            console_capture: None,
            exited: false,
            pause_count: 0,
            pause_pending: false,
            pause_waiters: Vec::new(),
            resume_tokens: HashMap::new(),
        }
    }

    /// The session is running iff there is at least one thread and all of
    /// them run.
    pub fn is_running(&self) -> bool {
        !self.threads.is_empty() && self.threads.iter().all(|t| t.running)
    }

    pub fn thread(&self, id: i64) -> Option<&ThreadInfo> {
        self.threads.iter().find(|t| t.id == id)
    }

    fn ensure_thread(&mut self, id: i64) -> &mut ThreadInfo {
        if let Some(index) = self.threads.iter().position(|t| t.id == id) {
            return &mut self.threads[index];
        }
        self.threads.push(ThreadInfo {
            id,
            name: format!("Thread {id}"),
            running: false,
            last_run_token: None,
        });
        self.threads.last_mut().unwrap_or_else(|| unreachable!())
    }

    pub fn note_thread_created(&mut self, id: i64, name: Option<&str>) {
        match name {
            Some(name) if !name.is_empty() => {
                self.ensure_thread(id).name = name.to_string();
            }
            _ => {
                self.ensure_thread(id);
                self.missing_thread_names = true;
            }
        }
    }

    pub fn note_thread_exited(&mut self, id: i64) {
        self.threads.retain(|t| t.id != id);
    }

    /// Replace thread facts with a `-thread-info` result.
    pub fn update_threads(&mut self, threads: Vec<(i64, Option<String>, bool)>) {
        for (id, name, running) in threads {
            let thread = self.ensure_thread(id);
            if let Some(name) = name {
                thread.name = name;
            }
            thread.running = running;
        }
        self.missing_thread_names = false;
    }

    /// Stale frame and variable handles must fail before any stopped or
    /// continued event reaches the client.
    pub fn reset_handles(&mut self) {
        self.frame_handles.reset();
        self.variable_handles.reset();
    }

    pub fn mark_running(&mut self, spec: &RunningSpec, token: Option<u64>) -> Vec<ContinuedEvent> {
        self.reset_handles();
        match spec {
            RunningSpec::All => {
                for thread in &mut self.threads {
                    thread.running = true;
                    thread.last_run_token = token;
                }
                let thread_id = self.threads.first().map(|t| t.id).unwrap_or(1);
                vec![ContinuedEvent {
                    thread_id,
                    all_threads: true,
                }]
            }
            RunningSpec::Thread(id) => {
                let thread = self.ensure_thread(*id);
                thread.running = true;
                thread.last_run_token = token;
                if self.is_running() {
                    vec![ContinuedEvent {
                        thread_id: *id,
                        all_threads: true,
                    }]
                } else {
                    vec![ContinuedEvent {
                        thread_id: *id,
                        all_threads: false,
                    }]
                }
            }
        }
    }

    pub fn note_stopped(&mut self, info: &StopInfo) -> StoppedOutcome {
        self.reset_handles();

        if info.all_threads {
            for thread in &mut self.threads {
                thread.running = false;
            }
        } else if let Some(id) = info.thread_id {
            self.ensure_thread(id).running = false;
        }

        let thread_id = info
            .thread_id
            .or_else(|| self.threads.first().map(|t| t.id))
            .unwrap_or(1);

        let reason = info.reason.as_deref().unwrap_or("");

        // A stop this adapter provoked itself (pause bracket, silent
        // pause): resolve the waiters, tell the client nothing.
        if reason == "signal-received" && (self.pause_pending || !self.pause_waiters.is_empty()) {
            self.pause_pending = false;
            for waiter in self.pause_waiters.drain(..) {
                let _ = waiter.send(());
            }
            return StoppedOutcome::Silent;
        }

        match reason {
            "exited" | "exited-normally" | "exited-signalled" => {
                self.exited = true;
                self.threads.clear();
                StoppedOutcome::Terminated
            }
            "breakpoint-hit" => {
                if let Some(message) = info.bkptno.and_then(|n| self.logpoints.get(&n)) {
                    return StoppedOutcome::Logpoint {
                        message: message.clone(),
                        thread_id,
                    };
                }
                let reason = if info
                    .bkptno
                    .is_some_and(|n| self.function_breakpoints.contains(&n))
                {
                    "function breakpoint"
                } else {
                    "breakpoint"
                };
                StoppedOutcome::Event {
                    reason: reason.to_string(),
                    thread_id,
                    all_threads: info.all_threads,
                }
            }
            "end-stepping-range" | "function-finished" => StoppedOutcome::Event {
                reason: "step".to_string(),
                thread_id,
                all_threads: info.all_threads,
            },
            "signal-received" => StoppedOutcome::Event {
                reason: info
                    .signal_name
                    .clone()
                    .unwrap_or_else(|| "signal".to_string()),
                thread_id,
                all_threads: info.all_threads,
            },
            _ => StoppedOutcome::Event {
                reason: "generic".to_string(),
                thread_id,
                all_threads: info.all_threads,
            },
        }
    }

    fn new_pause_waiter(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pause_waiters.push(tx);
        rx
    }

    /// Open a pause bracket. Only the first concurrent bracket actually
    /// interrupts the target; later ones share its pause.
    pub fn begin_pause(&mut self) -> PauseAction {
        if self.pause_count > 0 {
            self.pause_count += 1;
            if self.pause_pending {
                return PauseAction::Wait(self.new_pause_waiter());
            }
            return PauseAction::Joined;
        }
        if self.is_running() {
            self.pause_count = 1;
            self.pause_pending = true;
            if self.configuring == ConfiguringState::Configuring {
                // First pause-requiring request of the configuration phase:
                // the configuration itself takes a hold that only
                // `configurationDone` releases.
                self.configuring = ConfiguringState::ConfiguringPaused;
                self.pause_count += 1;
            }
            return PauseAction::Interrupt(self.new_pause_waiter());
        }
        PauseAction::NotNeeded
    }

    /// Close a pause bracket opened with a counted [`PauseAction`]. The
    /// last close resumes.
    pub fn end_pause(&mut self) -> ResumeAction {
        debug_assert!(self.pause_count > 0, "unbalanced pause bracket");
        self.pause_count = self.pause_count.saturating_sub(1);
        if self.pause_count > 0 {
            return ResumeAction::None;
        }
        if self.configuring == ConfiguringState::Finishing {
            self.configuring = ConfiguringState::Done;
            return ResumeAction::InitialResume;
        }
        ResumeAction::Continue
    }

    /// Undo a [`begin_pause`](Self::begin_pause) whose interrupt could not
    /// be sent: drop the count without resuming anything.
    pub fn abort_pause(&mut self) {
        self.pause_count = self.pause_count.saturating_sub(1);
        self.pause_pending = false;
        self.pause_waiters.clear();
    }

    /// A silent pause outside any bracket (custom reset): the stop must be
    /// suppressed but nothing will resume the target afterwards. Returns
    /// `None` when the target is already stopped.
    pub fn begin_silent_pause(&mut self) -> Option<oneshot::Receiver<()>> {
        if !self.is_running() {
            return None;
        }
        self.pause_pending = true;
        Some(self.new_pause_waiter())
    }

    /// Enter the configuration phase after `launch`/`attach` finished its
    /// setup sequence.
    pub fn enter_configuration_phase(&mut self) {
        if self.is_running() {
            self.configuring = ConfiguringState::Configuring;
        } else {
            self.configuring = ConfiguringState::ConfiguringPaused;
            self.pause_count += 1;
        }
    }

    /// `configurationDone` arrived. Returns true when the configuration
    /// phase holds a pause that must now be released with [`end_pause`].
    pub fn finish_configuration(&mut self) -> bool {
        match self.configuring {
            ConfiguringState::ConfiguringPaused => {
                self.configuring = ConfiguringState::Finishing;
                true
            }
            _ => {
                self.configuring = ConfiguringState::Done;
                false
            }
        }
    }

    pub fn record_resume_token(&mut self, token: u64, scope: ResumeScope) {
        match &scope {
            ResumeScope::All => {
                for thread in &mut self.threads {
                    thread.last_run_token = Some(token);
                }
            }
            ResumeScope::Thread(id) => {
                self.ensure_thread(*id).last_run_token = Some(token);
            }
        }
        self.resume_tokens.insert(token, scope);
    }

    pub fn clear_resume_token(&mut self, token: u64) {
        self.resume_tokens.remove(&token);
    }

    /// A resume command was reported failed after the fact: stop the
    /// threads it claimed to move and synthesize stopped events for them,
    /// returned as `(thread_id, all_threads_stopped)` pairs.
    pub fn resume_failed(&mut self, token: u64) -> Vec<(i64, bool)> {
        let Some(_scope) = self.resume_tokens.remove(&token) else {
            return Vec::new();
        };
        let mut affected = Vec::new();
        for thread in &mut self.threads {
            if thread.last_run_token == Some(token) && thread.running {
                thread.running = false;
                affected.push(thread.id);
            }
        }
        if affected.is_empty() {
            return Vec::new();
        }
        self.reset_handles();
        let all_threads = self.threads.iter().all(|t| !t.running);
        affected
            .into_iter()
            .map(|thread_id| (thread_id, all_threads))
            .collect()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn running_state(threads: usize) -> SessionState {
        let mut state = SessionState::new();
        for id in 1..=threads as i64 {
            state.note_thread_created(id, Some(&format!("t{id}")));
            state.mark_running(&RunningSpec::Thread(id), None);
        }
        state
    }

    fn silent_stop() -> StopInfo {
        StopInfo {
            thread_id: Some(1),
            all_threads: true,
            reason: Some("signal-received".to_string()),
            signal_name: Some("SIGINT".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn is_running_requires_all_threads() {
        let mut state = running_state(2);
        assert!(state.is_running());
        state.note_stopped(&StopInfo {
            thread_id: Some(2),
            reason: Some("breakpoint-hit".to_string()),
            bkptno: Some(1),
            ..Default::default()
        });
        assert!(!state.is_running());
    }

    #[test]
    fn pause_bracket_sends_one_interrupt_and_one_continue() {
        let mut state = running_state(2);

        let first = state.begin_pause();
        assert!(matches!(first, PauseAction::Interrupt(_)));
        let second = state.begin_pause();
        assert!(matches!(second, PauseAction::Wait(_)));

        // The silent stop resolves both waiters and is suppressed.
        assert_eq!(state.note_stopped(&silent_stop()), StoppedOutcome::Silent);

        // Only the last close resumes.
        assert_eq!(state.end_pause(), ResumeAction::None);
        assert_eq!(state.end_pause(), ResumeAction::Continue);
    }

    #[test]
    fn pause_bracket_on_a_stopped_target_is_a_no_op() {
        let mut state = running_state(1);
        state.note_stopped(&StopInfo {
            thread_id: Some(1),
            all_threads: true,
            reason: Some("breakpoint-hit".to_string()),
            ..Default::default()
        });

        let action = state.begin_pause();
        assert!(matches!(action, PauseAction::NotNeeded));
        assert!(!action.counted());
    }

    #[test]
    fn bracket_joining_a_held_pause_does_not_interrupt_again() {
        let mut state = running_state(1);
        let first = state.begin_pause();
        assert!(matches!(first, PauseAction::Interrupt(_)));
        state.note_stopped(&silent_stop());

        // Stop observed, pause still held: join without waiting.
        assert!(matches!(state.begin_pause(), PauseAction::Joined));
        assert_eq!(state.end_pause(), ResumeAction::None);
        assert_eq!(state.end_pause(), ResumeAction::Continue);
    }

    #[test]
    fn launch_configuration_holds_the_pause_until_configuration_done() {
        let mut state = SessionState::new();
        // launch: the target has not started, so configuration enters
        // paused with a hold.
        state.enter_configuration_phase();
        assert_eq!(state.configuring, ConfiguringState::ConfiguringPaused);

        // setBreakpoints during configuration shares the hold.
        assert!(matches!(state.begin_pause(), PauseAction::Joined));
        assert_eq!(state.end_pause(), ResumeAction::None);

        // configurationDone releases the hold; the resume is the initial
        // run.
        assert!(state.finish_configuration());
        assert_eq!(state.end_pause(), ResumeAction::InitialResume);
        assert_eq!(state.configuring, ConfiguringState::Done);
    }

    #[test]
    fn attach_to_running_target_pauses_once_for_the_whole_configuration() {
        let mut state = running_state(1);
        state.enter_configuration_phase();
        assert_eq!(state.configuring, ConfiguringState::Configuring);

        // The first pause-requiring request interrupts and installs the
        // configuration hold on top of its own count.
        let action = state.begin_pause();
        assert!(matches!(action, PauseAction::Interrupt(_)));
        assert_eq!(state.configuring, ConfiguringState::ConfiguringPaused);
        state.note_stopped(&silent_stop());

        // The request's own bracket closes; the hold keeps the target
        // stopped.
        assert_eq!(state.end_pause(), ResumeAction::None);

        assert!(state.finish_configuration());
        assert_eq!(state.end_pause(), ResumeAction::InitialResume);
    }

    #[test]
    fn silent_pause_is_suppressed() {
        let mut state = running_state(1);
        let waiter = state.begin_silent_pause();
        assert!(waiter.is_some());

        assert_eq!(state.note_stopped(&silent_stop()), StoppedOutcome::Silent);
        // The waiter has been resolved.
        assert!(waiter.unwrap().try_recv().is_ok());
    }

    #[test]
    fn a_user_visible_sigint_is_not_suppressed() {
        let mut state = running_state(1);
        let outcome = state.note_stopped(&silent_stop());
        assert_eq!(
            outcome,
            StoppedOutcome::Event {
                reason: "SIGINT".to_string(),
                thread_id: 1,
                all_threads: true,
            }
        );
    }

    #[test]
    fn stop_reasons_map_to_dap_reasons() {
        let mut state = running_state(1);
        state.function_breakpoints.insert(4);
        state.logpoints.insert(9, "x is {x}".to_string());

        let outcome = state.note_stopped(&StopInfo {
            thread_id: Some(1),
            reason: Some("breakpoint-hit".to_string()),
            bkptno: Some(4),
            ..Default::default()
        });
        assert_eq!(
            outcome,
            StoppedOutcome::Event {
                reason: "function breakpoint".to_string(),
                thread_id: 1,
                all_threads: false,
            }
        );

        let outcome = state.note_stopped(&StopInfo {
            thread_id: Some(1),
            reason: Some("breakpoint-hit".to_string()),
            bkptno: Some(9),
            ..Default::default()
        });
        assert_eq!(
            outcome,
            StoppedOutcome::Logpoint {
                message: "x is {x}".to_string(),
                thread_id: 1,
            }
        );

        let outcome = state.note_stopped(&StopInfo {
            thread_id: Some(1),
            reason: Some("end-stepping-range".to_string()),
            ..Default::default()
        });
        assert_eq!(
            outcome,
            StoppedOutcome::Event {
                reason: "step".to_string(),
                thread_id: 1,
                all_threads: false,
            }
        );

        let outcome = state.note_stopped(&StopInfo {
            reason: Some("exited-normally".to_string()),
            ..Default::default()
        });
        assert_eq!(outcome, StoppedOutcome::Terminated);
    }

    #[test]
    fn running_one_of_two_threads_continues_individually() {
        let mut state = running_state(2);
        state.note_stopped(&StopInfo {
            all_threads: true,
            reason: Some("breakpoint-hit".to_string()),
            thread_id: Some(1),
            ..Default::default()
        });

        let events = state.mark_running(&RunningSpec::Thread(1), Some(5));
        assert_eq!(
            events,
            vec![ContinuedEvent {
                thread_id: 1,
                all_threads: false,
            }]
        );

        let events = state.mark_running(&RunningSpec::Thread(2), Some(6));
        assert_eq!(
            events,
            vec![ContinuedEvent {
                thread_id: 2,
                all_threads: true,
            }]
        );
    }

    #[test]
    fn failed_resume_token_stops_its_threads_retroactively() {
        let mut state = running_state(1);
        state.note_stopped(&StopInfo {
            all_threads: true,
            reason: Some("breakpoint-hit".to_string()),
            thread_id: Some(1),
            ..Default::default()
        });

        state.record_resume_token(42, ResumeScope::All);
        state.mark_running(&RunningSpec::All, Some(42));
        assert!(state.is_running());

        let events = state.resume_failed(42);
        assert_eq!(events.len(), 1);
        assert!(!state.is_running());

        // Unknown tokens do nothing.
        assert!(state.resume_failed(77).is_empty());
    }

    #[test]
    fn handles_from_before_a_stop_are_invalid_after_it() {
        let mut state = SessionState::new();
        let frame = FrameReference {
            thread_id: 1,
            frame_level: 0,
        };
        let handle = state.frame_handles.create(frame);
        assert_eq!(state.frame_handles.get(handle), Some(&frame));

        state.note_stopped(&StopInfo {
            thread_id: Some(1),
            reason: Some("breakpoint-hit".to_string()),
            ..Default::default()
        });

        assert_eq!(state.frame_handles.get(handle), None);

        let new_handle = state.frame_handles.create(frame);
        assert_ne!(handle, new_handle);
        assert_eq!(state.frame_handles.get(new_handle), Some(&frame));
    }

    #[test]
    fn thread_lifecycle_tracks_names() {
        let mut state = SessionState::new();
        state.note_thread_created(1, Some("mythreadname"));
        assert!(!state.missing_thread_names);
        state.note_thread_created(2, None);
        assert!(state.missing_thread_names);

        state.update_threads(vec![(2, Some("worker".to_string()), true)]);
        assert!(!state.missing_thread_names);
        assert_eq!(state.thread(2).unwrap().name, "worker");

        state.note_thread_exited(1);
        assert!(state.thread(1).is_none());
    }
}
