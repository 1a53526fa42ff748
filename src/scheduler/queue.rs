//! Pending work and the order it is taken in.

use std::collections::VecDeque;

use crate::model::{Action, Request};

/// One unit of work for the worker.
#[derive(Debug)]
pub(crate) enum Work {
    Action(Action),
    Request(Request),
    Prefetch(Request),
}

/// The three pending collections, guarded together by one mutex.
#[derive(Debug, Default)]
pub(crate) struct Queues {
    pub actions: VecDeque<Action>,
    pub requests: VecDeque<Request>,
    pub prefetch: VecDeque<Request>,
}

impl Queues {
    /// Take the next item: actions first, then on-demand requests, then one
    /// prefetch request (preferring `current_folder`).
    pub fn next(&mut self, current_folder: &str) -> Option<Work> {
        if let Some(action) = self.actions.pop_front() {
            return Some(Work::Action(action));
        }
        if let Some(request) = self.requests.pop_front() {
            return Some(Work::Request(request));
        }
        let pick = self
            .prefetch
            .iter()
            .position(|r| r.folder == current_folder)
            .unwrap_or(0);
        self.prefetch.remove(pick).map(Work::Prefetch)
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.requests.len() + self.prefetch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionKind;

    fn folder_of(work: Work) -> (char, String) {
        match work {
            Work::Action(a) => ('a', a.folder),
            Work::Request(r) => ('r', r.folder),
            Work::Prefetch(r) => ('p', r.folder),
        }
    }

    #[test]
    fn test_priority_order() {
        let mut queues = Queues::default();
        queues.prefetch.push_back(Request::uids("P"));
        queues.requests.push_back(Request::uids("R"));
        queues.actions.push_back(Action::new("A", [1], ActionKind::MarkSeen));
        assert_eq!(queues.len(), 3);

        let order: Vec<_> = std::iter::from_fn(|| queues.next("INBOX"))
            .map(folder_of)
            .collect();
        assert_eq!(
            order,
            vec![('a', "A".into()), ('r', "R".into()), ('p', "P".into())]
        );
        assert!(queues.next("INBOX").is_none());
    }

    #[test]
    fn test_prefetch_prefers_current_folder() {
        let mut queues = Queues::default();
        queues.prefetch.push_back(Request::uids("Archive"));
        queues.prefetch.push_back(Request::uids("INBOX"));
        queues.prefetch.push_back(Request::uids("Sent"));

        let order: Vec<_> = std::iter::from_fn(|| queues.next("INBOX"))
            .map(|w| folder_of(w).1)
            .collect();
        assert_eq!(order, vec!["INBOX", "Archive", "Sent"]);
    }
}
