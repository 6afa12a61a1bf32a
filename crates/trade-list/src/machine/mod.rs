use crate::queries::TradeListQuery;
use crate::types::{Trade, TradeConnection};
use rollql::{Cursor, QueryMachine, QueryPayload, ShapeError};
use std::fmt;

/// Pages through the `TradeList` query one request at a time, following
/// each page's end cursor until the server stops returning one
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TradeList {
    query: TradeListQuery,
    state: State,
    results: Vec<Output>,
    report: FetchReport,
}

impl TradeList {
    /// `start` is the cursor to request the first page after, if any
    pub(crate) fn new(query: TradeListQuery, start: Option<Cursor>) -> TradeList {
        TradeList {
            query,
            state: State::Ready(start),
            results: Vec::new(),
            report: FetchReport::default(),
        }
    }

    fn done(&mut self) -> State {
        self.results.push(Output::Report(self.report));
        State::Done
    }
}

impl QueryMachine for TradeList {
    type Output = Output;

    fn get_next_query(&mut self) -> Option<QueryPayload> {
        let (state, output) = match std::mem::replace(&mut self.state, State::Error) {
            State::Ready(cursor) => {
                let payload = self.query.payload(cursor.as_ref());
                (State::Awaiting(cursor), Some(payload))
            }
            State::Awaiting(_) => {
                panic!("get_next_query() called while awaiting a response")
            }
            State::Exhausted => (self.done(), None),
            State::Done => (State::Done, None),
            State::Error => panic!("get_next_query() called after machine errored"),
        };
        self.state = state;
        output
    }

    fn handle_response(&mut self, data: &serde_json::Value) -> Result<(), ShapeError> {
        let requested = match std::mem::replace(&mut self.state, State::Error) {
            State::Awaiting(cursor) => cursor,
            State::Ready(_) | State::Exhausted | State::Done => {
                panic!("handle_response() called without an outstanding query")
            }
            State::Error => panic!("handle_response() called after machine errored"),
        };
        // Trades are output as they are parsed, so a page that breaks off
        // partway still yields everything before the break.
        let conn = TradeConnection::from_document(data)?;
        for trade in conn.trades()? {
            let trade = trade?;
            self.report.trades += 1;
            self.report.items += trade.items.len();
            self.results.push(Output::Trade(trade));
        }
        let end_cursor = conn.end_cursor()?;
        self.report.pages += 1;
        self.state = match end_cursor {
            Some(next) if requested.as_ref() == Some(&next) => {
                log::warn!("Server returned the cursor {next:?} that was just requested; stopping");
                State::Exhausted
            }
            Some(next) => {
                self.results.push(Output::NextPage);
                State::Ready(Some(next))
            }
            None => State::Exhausted,
        };
        Ok(())
    }

    fn get_output(&mut self) -> Vec<Self::Output> {
        self.results.drain(..).collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum State {
    /// A request for the page after the given cursor should be made next
    Ready(Option<Cursor>),
    /// A request for the page after the given cursor has been handed out
    Awaiting(Option<Cursor>),
    /// The last page has been processed
    Exhausted,
    Done,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Output {
    Trade(Trade),
    /// Emitted when a page carried a cursor and another request will follow
    NextPage,
    Report(FetchReport),
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct FetchReport {
    pub(crate) pages: usize,
    pub(crate) trades: usize,
    pub(crate) items: usize,
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fetched {} trades ({} items) across {} pages",
            self.trades, self.items, self.pages
        )
    }
}
