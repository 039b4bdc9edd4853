//! Participant/admin page flow
//!
//! ```text
//! LoggedOut ─┬─> AdminHome
//!            └─> Demographics ─> Instructions ─> Instructions2 ─> Task ─> Submitted
//! ```
//!
//! The only progress flag kept in the session is whether demographics were
//! completed; every protected page is gated on it, and a request that is not
//! allowed is redirected backwards. `Submitted` destroys the session, which
//! puts the browser back in `LoggedOut`.

use clickmark_common::config::ParticipantMode;

use crate::session::SessionData;

/// Pages whose access depends on the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    AdminHome,
    Demographics,
    Instructions,
    Instructions2,
    Task,
}

impl Page {
    /// Pages that require completed demographics
    pub const PARTICIPANT_PAGES: [Page; 3] = [Page::Instructions, Page::Instructions2, Page::Task];

    pub fn path(self, mode: ParticipantMode) -> &'static str {
        match self {
            Page::AdminHome => "/admin",
            Page::Demographics => mode.demographics_path(),
            Page::Instructions => "/instructions",
            Page::Instructions2 => "/instructions2",
            Page::Task => "/user",
        }
    }

    /// Page reached by submitting this page's form
    pub fn next(self) -> Option<Page> {
        match self {
            Page::Demographics => Some(Page::Instructions),
            Page::Instructions => Some(Page::Instructions2),
            Page::Instructions2 => Some(Page::Task),
            Page::AdminHome | Page::Task => None,
        }
    }
}

/// Where a session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    LoggedOut,
    AdminHome,
    Demographics,
    /// Demographics done; instructions and task are reachable
    Instructions,
}

pub fn current_state(session: Option<&SessionData>) -> WorkflowState {
    match session {
        None => WorkflowState::LoggedOut,
        Some(SessionData::Admin(_)) => WorkflowState::AdminHome,
        Some(SessionData::Participant(p)) if p.demographics_completed() => WorkflowState::Instructions,
        Some(SessionData::Participant(_)) => WorkflowState::Demographics,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Redirect(&'static str),
}

/// Decide whether `session` may view `page`
pub fn gate(mode: ParticipantMode, session: Option<&SessionData>, page: Page) -> Gate {
    let state = current_state(session);

    match page {
        Page::AdminHome => match state {
            WorkflowState::AdminHome => Gate::Allow,
            _ => Gate::Redirect("/login"),
        },
        Page::Demographics => match state {
            WorkflowState::AdminHome => Gate::Redirect(Page::AdminHome.path(mode)),
            WorkflowState::Instructions => Gate::Redirect(Page::Instructions.path(mode)),
            WorkflowState::Demographics => Gate::Allow,
            WorkflowState::LoggedOut => match mode {
                ParticipantMode::Account => Gate::Redirect("/login"),
                ParticipantMode::Anonymous => Gate::Allow,
            },
        },
        Page::Instructions | Page::Instructions2 | Page::Task => match state {
            WorkflowState::Instructions => Gate::Allow,
            WorkflowState::AdminHome => Gate::Redirect(Page::AdminHome.path(mode)),
            WorkflowState::Demographics => Gate::Redirect(Page::Demographics.path(mode)),
            WorkflowState::LoggedOut => Gate::Redirect(mode.entry_path()),
        },
    }
}

/// Landing page right after a successful login
pub fn after_login(session: &SessionData) -> &'static str {
    match session {
        SessionData::Admin(_) => "/admin",
        SessionData::Participant(_) => "/user",
    }
}
