use rollql::{Cursor, Extensions, JsonMap, PersistedQuery, QueryPayload};
use std::num::NonZeroUsize;

pub(crate) static OPERATION_NAME: &str = "TradeList";
pub(crate) static QUERY_HASH: &str =
    "0f3a1ea7529016eaa9d8daee8fa24661e437d1a80d81670003b9484dc47bcb4c";
pub(crate) const QUERY_VERSION: u32 = 1;

#[allow(unsafe_code)]
// SAFETY: 50 != 0
pub(crate) const DEFAULT_PAGE_SIZE: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(50) };
pub(crate) static DEFAULT_ORDER_BY: &str = "BEST_DEALS";
pub(crate) static DEFAULT_STATUS: &str = "LISTED";
pub(crate) static DEFAULT_APP: &str = "CSGO";
pub(crate) static DEFAULT_TIMESTAMP: &str = "1734586625135";

/// The unchanging part of a request for the `TradeList` persisted query.
/// Payloads for individual pages are built from this plus a cursor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TradeListQuery {
    pub(crate) operation_name: String,
    pub(crate) persisted_query: PersistedQuery,
    pub(crate) filter: TradeFilter,
}

impl TradeListQuery {
    pub(crate) fn payload(&self, cursor: Option<&Cursor>) -> QueryPayload {
        QueryPayload {
            operation_name: self.operation_name.clone(),
            variables: self.filter.variables(cursor),
            extensions: Extensions {
                persisted_query: self.persisted_query.clone(),
            },
        }
    }
}

impl Default for TradeListQuery {
    fn default() -> TradeListQuery {
        TradeListQuery {
            operation_name: String::from(OPERATION_NAME),
            persisted_query: PersistedQuery {
                version: QUERY_VERSION,
                sha256_hash: String::from(QUERY_HASH),
            },
            filter: TradeFilter::default(),
        }
    }
}

/// Which trades to list and in what order
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TradeFilter {
    /// How many trades to request per page
    pub(crate) page_size: NonZeroUsize,

    /// Sort key, e.g. `BEST_DEALS`
    pub(crate) order_by: String,

    /// Trade status to filter on, e.g. `LISTED`
    pub(crate) status: String,

    /// Which game's items to list
    pub(crate) app: String,

    /// Opaque timestamp value the persisted query requires
    pub(crate) timestamp: String,
}

impl TradeFilter {
    /// Build the `variables` object for the page after `cursor`.  When there
    /// is no cursor, the `after` variable is left out entirely rather than
    /// sent as `null`.
    fn variables(&self, cursor: Option<&Cursor>) -> JsonMap {
        let mut variables = JsonMap::from_iter([
            ("first".into(), self.page_size.get().into()),
            ("orderBy".into(), self.order_by.clone().into()),
            ("status".into(), self.status.clone().into()),
            ("steamAppName".into(), self.app.clone().into()),
            ("t".into(), self.timestamp.clone().into()),
        ]);
        if let Some(c) = cursor {
            variables.insert("after".into(), c.clone().into());
        }
        variables
    }
}

impl Default for TradeFilter {
    fn default() -> TradeFilter {
        TradeFilter {
            page_size: DEFAULT_PAGE_SIZE,
            order_by: String::from(DEFAULT_ORDER_BY),
            status: String::from(DEFAULT_STATUS),
            app: String::from(DEFAULT_APP),
            timestamp: String::from(DEFAULT_TIMESTAMP),
        }
    }
}
