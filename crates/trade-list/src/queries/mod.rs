mod trade_list;
pub(crate) use self::trade_list::*;
