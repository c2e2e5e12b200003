//! Navigation state machine
//!
//! Pure bookkeeping for "which page is current" and the serialization of
//! page transitions. [`NavState::apply`] never performs I/O; it returns the
//! effects the controller must carry out.

use super::types::PageNumber;
use crate::error::ValidationError;

/// Identifies one caller waiting on a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

/// How a navigation request ended
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The page is on the canvas
    Displayed(PageNumber),
    /// Boundary move or already showing the page; nothing was rendered
    Unchanged(PageNumber),
    /// Invalid request, no state change
    Rejected(ValidationError),
    /// A newer request took this one's place
    Superseded,
    /// The page could not be rendered; the previous canvas stays up
    Failed(String),
    /// The controller has shut down
    Closed,
}

impl Outcome {
    #[must_use]
    pub fn is_displayed(&self) -> bool {
        matches!(self, Self::Displayed(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Transition {
    page: PageNumber,
    tickets: Vec<Ticket>,
}

/// Inputs to the state machine
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Go to an absolute page
    GoTo {
        ticket: Ticket,
        page: i64,
        force: bool,
    },
    /// Move relative to the newest requested page
    Step { ticket: Ticket, delta: i64 },
    /// Re-render the current page from scratch (scale changed)
    Refresh { ticket: Ticket },
    /// The running transition's page reached the canvas
    Displayed(PageNumber),
    /// The running transition's render failed
    Failed { page: PageNumber, reason: String },
}

/// Work the controller must perform
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Accept `page`: persist, announce, then blit from cache or render
    Begin(PageNumber),
    /// Cancel the visible render
    CancelRender,
    /// Answer a waiting caller
    Resolve { ticket: Ticket, outcome: Outcome },
    /// `page` is displayed with nothing queued behind it
    Settled(PageNumber),
}

#[derive(Clone, Debug)]
pub struct NavState {
    page_count: u32,
    current: PageNumber,
    /// Page whose render is on the canvas
    shown: Option<PageNumber>,
    running: Option<Transition>,
    pending: Option<Transition>,
}

impl NavState {
    #[must_use]
    pub fn new(page_count: u32, current: PageNumber) -> Self {
        Self {
            page_count,
            current,
            shown: None,
            running: None,
            pending: None,
        }
    }

    #[must_use]
    pub fn current(&self) -> PageNumber {
        self.current
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    #[must_use]
    pub fn shown(&self) -> Option<PageNumber> {
        self.shown
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    #[must_use]
    pub fn pending_page(&self) -> Option<PageNumber> {
        self.pending.as_ref().map(|t| t.page)
    }

    /// Newest page anyone has asked for
    #[must_use]
    pub fn target(&self) -> PageNumber {
        self.pending_page().unwrap_or(self.current)
    }

    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::GoTo {
                ticket,
                page,
                force,
            } => match PageNumber::within(page, self.page_count) {
                Some(page) => self.request(ticket, page, force),
                None => {
                    log::debug!("Rejecting page {page} (document has {})", self.page_count);
                    vec![Effect::Resolve {
                        ticket,
                        outcome: Outcome::Rejected(ValidationError::PageOutOfRange {
                            page,
                            page_count: self.page_count,
                        }),
                    }]
                }
            },

            Command::Step { ticket, delta } => {
                let base = self.target();
                match PageNumber::within(i64::from(base.get()) + delta, self.page_count) {
                    Some(page) => self.request(ticket, page, false),
                    None => vec![Effect::Resolve {
                        ticket,
                        outcome: Outcome::Unchanged(base),
                    }],
                }
            }

            Command::Refresh { ticket } => {
                self.shown = None;
                self.request(ticket, self.current, true)
            }

            Command::Displayed(page) => {
                let Some(running) = self.take_running(page) else {
                    return vec![];
                };
                self.shown = Some(page);

                let mut effects = resolve_all(running.tickets, &Outcome::Displayed(page));
                match self.pending.take() {
                    Some(next) => effects.extend(self.begin(next)),
                    None => effects.push(Effect::Settled(page)),
                }
                effects
            }

            Command::Failed { page, reason } => {
                let Some(running) = self.take_running(page) else {
                    return vec![];
                };

                let mut effects = resolve_all(running.tickets, &Outcome::Failed(reason));
                if let Some(next) = self.pending.take() {
                    effects.extend(self.begin(next));
                }
                effects
            }
        }
    }

    fn request(&mut self, ticket: Ticket, page: PageNumber, force: bool) -> Vec<Effect> {
        let mut effects = Vec::new();

        if force {
            if let Some(pending) = self.pending.take() {
                effects.extend(resolve_all(pending.tickets, &Outcome::Superseded));
            }
            if let Some(running) = self.running.take() {
                effects.push(Effect::CancelRender);
                effects.extend(resolve_all(running.tickets, &Outcome::Superseded));
            }
            effects.extend(self.begin(Transition {
                page,
                tickets: vec![ticket],
            }));
            return effects;
        }

        let Some(running) = self.running.as_mut() else {
            if self.shown == Some(page) && self.current == page {
                effects.push(Effect::Resolve {
                    ticket,
                    outcome: Outcome::Unchanged(page),
                });
            } else {
                effects.extend(self.begin(Transition {
                    page,
                    tickets: vec![ticket],
                }));
            }
            return effects;
        };

        if running.page == page {
            // Back to the page already rendering; anything queued is obsolete
            running.tickets.push(ticket);
            if let Some(old) = self.pending.take() {
                effects.extend(resolve_all(old.tickets, &Outcome::Superseded));
            }
            return effects;
        }

        match &mut self.pending {
            Some(pending) if pending.page == page => pending.tickets.push(ticket),
            slot => {
                if let Some(old) = slot.take() {
                    effects.extend(resolve_all(old.tickets, &Outcome::Superseded));
                }
                *slot = Some(Transition {
                    page,
                    tickets: vec![ticket],
                });
            }
        }

        effects
    }

    fn begin(&mut self, transition: Transition) -> Vec<Effect> {
        let page = transition.page;
        self.current = page;
        self.running = Some(transition);
        vec![Effect::Begin(page)]
    }

    fn take_running(&mut self, page: PageNumber) -> Option<Transition> {
        if self.running.as_ref().is_some_and(|t| t.page == page) {
            self.running.take()
        } else {
            None
        }
    }
}

fn resolve_all(tickets: Vec<Ticket>, outcome: &Outcome) -> Vec<Effect> {
    tickets
        .into_iter()
        .map(|ticket| Effect::Resolve {
            ticket,
            outcome: outcome.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    fn go(ticket: u64, page: i64) -> Command {
        Command::GoTo {
            ticket: Ticket(ticket),
            page,
            force: false,
        }
    }

    fn resolved(ticket: u64, outcome: Outcome) -> Effect {
        Effect::Resolve {
            ticket: Ticket(ticket),
            outcome,
        }
    }

    /// State with page `n` displayed and idle
    fn showing(n: u32) -> NavState {
        let mut state = NavState::new(100, page(n));
        let _ = state.apply(Command::Refresh { ticket: Ticket(0) });
        let _ = state.apply(Command::Displayed(page(n)));
        state
    }

    #[test]
    fn out_of_range_is_rejected_without_state_change() {
        let mut state = showing(1);

        for bad in [0, -1, 101] {
            let effects = state.apply(go(1, bad));
            assert_eq!(
                effects,
                vec![resolved(
                    1,
                    Outcome::Rejected(ValidationError::PageOutOfRange {
                        page: bad,
                        page_count: 100
                    })
                )]
            );
        }
        assert_eq!(state.current(), page(1));
        assert!(!state.is_busy());
    }

    #[test]
    fn idle_request_begins_immediately() {
        let mut state = showing(1);

        assert_eq!(state.apply(go(1, 5)), vec![Effect::Begin(page(5))]);
        assert_eq!(state.current(), page(5));
        assert!(state.is_busy());

        assert_eq!(
            state.apply(Command::Displayed(page(5))),
            vec![
                resolved(1, Outcome::Displayed(page(5))),
                Effect::Settled(page(5))
            ]
        );
        assert_eq!(state.shown(), Some(page(5)));
    }

    #[test]
    fn queued_requests_coalesce_to_the_newest() {
        let mut state = showing(1);
        let _ = state.apply(go(1, 5));

        assert!(state.apply(go(2, 6)).is_empty());
        assert_eq!(state.apply(go(3, 7)), vec![resolved(2, Outcome::Superseded)]);
        assert_eq!(state.pending_page(), Some(page(7)));

        // The running transition finishes, then the survivor starts
        assert_eq!(
            state.apply(Command::Displayed(page(5))),
            vec![
                resolved(1, Outcome::Displayed(page(5))),
                Effect::Begin(page(7))
            ]
        );
        assert_eq!(state.current(), page(7));
    }

    #[test]
    fn duplicate_requests_share_a_transition() {
        let mut state = showing(1);
        let _ = state.apply(go(1, 5));
        assert!(state.apply(go(2, 5)).is_empty());

        let _ = state.apply(go(3, 9));
        assert!(state.apply(go(4, 9)).is_empty());

        let effects = state.apply(Command::Displayed(page(5)));
        assert!(effects.contains(&resolved(1, Outcome::Displayed(page(5)))));
        assert!(effects.contains(&resolved(2, Outcome::Displayed(page(5)))));

        assert_eq!(
            state.apply(Command::Displayed(page(9))),
            vec![
                resolved(3, Outcome::Displayed(page(9))),
                resolved(4, Outcome::Displayed(page(9))),
                Effect::Settled(page(9))
            ]
        );
    }

    #[test]
    fn force_supersedes_running_and_pending() {
        let mut state = showing(1);
        let _ = state.apply(go(1, 5));
        let _ = state.apply(go(2, 8));

        let effects = state.apply(Command::GoTo {
            ticket: Ticket(3),
            page: 6,
            force: true,
        });
        assert_eq!(
            effects,
            vec![
                resolved(2, Outcome::Superseded),
                Effect::CancelRender,
                resolved(1, Outcome::Superseded),
                Effect::Begin(page(6)),
            ]
        );

        // A late completion for page 5 is ignored
        assert!(state.apply(Command::Displayed(page(5))).is_empty());
        assert_eq!(state.current(), page(6));
        assert!(state.is_busy());
    }

    #[test]
    fn steps_are_relative_to_the_newest_request() {
        let mut state = showing(1);

        assert_eq!(
            state.apply(Command::Step {
                ticket: Ticket(1),
                delta: -1
            }),
            vec![resolved(1, Outcome::Unchanged(page(1)))]
        );
        assert!(!state.is_busy());

        let _ = state.apply(Command::Step {
            ticket: Ticket(2),
            delta: 1,
        });
        let _ = state.apply(Command::Step {
            ticket: Ticket(3),
            delta: 1,
        });
        assert_eq!(state.current(), page(2));
        assert_eq!(state.pending_page(), Some(page(3)));
    }

    #[test]
    fn going_to_the_shown_page_is_unchanged() {
        let mut state = showing(4);
        assert_eq!(state.apply(go(1, 4)), vec![resolved(1, Outcome::Unchanged(page(4)))]);
    }

    #[test]
    fn failure_resolves_and_proceeds_with_queue() {
        let mut state = showing(1);
        let _ = state.apply(go(1, 5));
        let _ = state.apply(go(2, 6));

        let effects = state.apply(Command::Failed {
            page: page(5),
            reason: "boom".into(),
        });
        assert_eq!(
            effects,
            vec![
                resolved(1, Outcome::Failed("boom".into())),
                Effect::Begin(page(6))
            ]
        );
        assert_eq!(state.shown(), Some(page(1)));
    }

    #[test]
    fn refresh_rerenders_current_page() {
        let mut state = showing(3);
        assert_eq!(
            state.apply(Command::Refresh { ticket: Ticket(1) }),
            vec![Effect::Begin(page(3))]
        );
        assert_eq!(state.shown(), None);
    }
}
