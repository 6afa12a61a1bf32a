use rollql::{Cursor, Node, ShapeError};
use serde_json::{Number, Value};
use std::fmt;

/// Shown in place of an item's name when the listing doesn't provide one
pub(crate) static NO_NAME: &str = "N/A";

/// The `data.trades` connection in one page of `TradeList` results.  Trades
/// and the end cursor are read separately so that each trade can be used as
/// soon as it has been parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TradeConnection<'a>(Node<'a>);

impl<'a> TradeConnection<'a> {
    pub(crate) fn from_document(doc: &'a Value) -> Result<TradeConnection<'a>, ShapeError> {
        Node::root(doc)
            .get("data")?
            .get("trades")
            .map(TradeConnection)
    }

    /// Parse `edges[].node` one trade at a time
    pub(crate) fn trades(
        &self,
    ) -> Result<impl Iterator<Item = Result<Trade, ShapeError>> + use<'a>, ShapeError> {
        Ok(self
            .0
            .get("edges")?
            .elements()?
            .map(|edge| Trade::from_node(&edge.get("node")?)))
    }

    /// Where the next page starts; `None` when this is the last page
    pub(crate) fn end_cursor(&self) -> Result<Option<Cursor>, ShapeError> {
        Ok(self
            .0
            .get("pageInfo")?
            .get_opt("endCursor")?
            .map(|n| n.as_str().map(Cursor::from))
            .transpose()?
            .filter(|c| !c.as_str().is_empty()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Trade {
    /// The trade's ID as given by the server.  IDs that aren't strings are
    /// kept in their JSON form.
    pub(crate) id: String,
    pub(crate) items: Vec<TradeItem>,
}

impl Trade {
    fn from_node(node: &Node<'_>) -> Result<Trade, ShapeError> {
        let id = node.get("id")?;
        let id = match id.value() {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let items = node
            .get("tradeItems")?
            .elements()?
            .map(|item| TradeItem::from_node(&item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Trade { id, items })
    }
}

/// Writes the trade's ID line followed by one line per item.  The alternate
/// form (`{:#}`) also includes each item's price and markup and ends with a
/// blank line.
impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trade ID: {}", self.id)?;
        for item in &self.items {
            writeln!(f, " - {}", item.name())?;
            if f.alternate() {
                if let Some(ref value) = item.value {
                    writeln!(f, "   Price: {value}")?;
                }
                if let Some(ref markup) = item.markup_percent {
                    writeln!(f, "   Price Compared to Market: {markup}%")?;
                }
            }
        }
        if f.alternate() {
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TradeItem {
    pub(crate) market_name: Option<String>,
    pub(crate) value: Option<Number>,
    pub(crate) markup_percent: Option<Number>,
}

impl TradeItem {
    // Only the structure leading to the item is required; a field of the
    // wrong type is treated the same as a missing one.
    fn from_node(node: &Node<'_>) -> Result<TradeItem, ShapeError> {
        let field = |key| node.get_opt(key).map(|n| n.map(|n| n.value()));
        Ok(TradeItem {
            market_name: field("marketName")?
                .and_then(Value::as_str)
                .map(String::from),
            value: field("value")?.and_then(as_number),
            markup_percent: field("markupPercent")?.and_then(as_number),
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.market_name.as_deref().unwrap_or(NO_NAME)
    }
}

fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn item(name: Option<&str>) -> TradeItem {
        TradeItem {
            market_name: name.map(String::from),
            value: None,
            markup_percent: None,
        }
    }

    fn parse(doc: &Value) -> Result<(Vec<Trade>, Option<Cursor>), ShapeError> {
        let conn = TradeConnection::from_document(doc)?;
        let trades = conn.trades()?.collect::<Result<Vec<_>, _>>()?;
        Ok((trades, conn.end_cursor()?))
    }

    #[test]
    fn parse_page() {
        let doc = json!({
            "data": {
                "trades": {
                    "edges": [
                        {
                            "node": {
                                "id": "VHJhZGU6MQ==",
                                "tradeItems": [
                                    {"marketName": "AK-47 | Redline", "value": 12.5, "markupPercent": -3},
                                    {"marketName": null},
                                ]
                            }
                        },
                        {"node": {"id": 42, "tradeItems": []}},
                    ],
                    "pageInfo": {"endCursor": "C2"}
                }
            }
        });
        let (trades, end_cursor) = parse(&doc).unwrap();
        assert_eq!(
            trades,
            [
                Trade {
                    id: "VHJhZGU6MQ==".into(),
                    items: vec![
                        TradeItem {
                            market_name: Some("AK-47 | Redline".into()),
                            value: Number::from_f64(12.5),
                            markup_percent: Some(Number::from(-3)),
                        },
                        item(None),
                    ],
                },
                Trade {
                    id: "42".into(),
                    items: Vec::new(),
                },
            ]
        );
        assert_eq!(end_cursor, Some(Cursor::from("C2")));
    }

    #[test]
    fn empty_edges_keep_cursor() {
        let doc = json!({
            "data": {"trades": {"edges": [], "pageInfo": {"endCursor": "C9"}}}
        });
        let (trades, end_cursor) = parse(&doc).unwrap();
        assert!(trades.is_empty());
        assert_eq!(end_cursor, Some(Cursor::from("C9")));
    }

    #[test]
    fn absent_null_or_empty_cursor_ends() {
        for page_info in [json!({}), json!({"endCursor": null}), json!({"endCursor": ""})] {
            let doc = json!({"data": {"trades": {"edges": [], "pageInfo": page_info.clone()}}});
            let (_, end_cursor) = parse(&doc).unwrap();
            assert_eq!(end_cursor, None, "pageInfo = {page_info}");
        }
    }

    #[test]
    fn missing_data() {
        let e = TradeConnection::from_document(&json!({})).unwrap_err();
        assert_eq!(e.missing_key(), Some("data"));
    }

    #[test]
    fn trades_readable_without_page_info() {
        let doc = json!({
            "data": {"trades": {"edges": [{"node": {"id": "T1", "tradeItems": []}}]}}
        });
        let conn = TradeConnection::from_document(&doc).unwrap();
        let trades = conn.trades().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(
            trades,
            [Trade {
                id: "T1".into(),
                items: Vec::new(),
            }]
        );
        let e = conn.end_cursor().unwrap_err();
        assert_eq!(e.missing_key(), Some("pageInfo"));
        assert_eq!(e.to_string(), r#"missing key "pageInfo" in $.data.trades"#);
    }

    #[test]
    fn missing_trade_items() {
        let doc = json!({
            "data": {
                "trades": {
                    "edges": [
                        {"node": {"id": "T1", "tradeItems": []}},
                        {"node": {"id": "T2"}},
                    ],
                    "pageInfo": {"endCursor": "C2"}
                }
            }
        });
        let conn = TradeConnection::from_document(&doc).unwrap();
        let mut trades = conn.trades().unwrap();
        assert_matches!(trades.next(), Some(Ok(Trade { id, .. })) if id == "T1");
        let e = trades.next().unwrap().unwrap_err();
        assert_eq!(
            e.to_string(),
            r#"missing key "tradeItems" in $.data.trades.edges[1].node"#
        );
    }

    #[test]
    fn edges_not_a_list() {
        let doc = json!({"data": {"trades": {"edges": "nope", "pageInfo": {}}}});
        assert_matches!(
            parse(&doc),
            Err(ShapeError::WrongType { expected: "an array", .. })
        );
    }

    #[test]
    fn display_trade() {
        let trade = Trade {
            id: "T1".into(),
            items: vec![item(Some("AK-47 | Redline")), item(None)],
        };
        assert_eq!(
            trade.to_string(),
            indoc! {"
            Trade ID: T1
             - AK-47 | Redline
             - N/A
            "}
        );
    }

    #[test]
    fn display_trade_with_prices() {
        let trade = Trade {
            id: "T1".into(),
            items: vec![
                TradeItem {
                    market_name: Some("AWP | Asiimov".into()),
                    value: Number::from_f64(88.25),
                    markup_percent: Some(Number::from(5)),
                },
                item(None),
            ],
        };
        assert_eq!(
            format!("{trade:#}"),
            indoc! {"
            Trade ID: T1
             - AWP | Asiimov
               Price: 88.25
               Price Compared to Market: 5%
             - N/A

            "}
        );
    }
}
