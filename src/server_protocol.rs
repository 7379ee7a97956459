use serde_json::Value;

use crate::types::Direction;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Hello {
        user_id: Option<u64>,
        name: String,
    },
    Pay,
    DebugPay,
    Start,
    /// `dir: None` releases every held direction.
    Input {
        dir: Option<Direction>,
        pressed: bool,
    },
    Swipe {
        dx: f32,
        dy: f32,
    },
    Leaderboard {
        limit: Option<i64>,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            let user_id = match parse_optional_i64(object.get("userId"))? {
                None => None,
                Some(id) => Some(u64::try_from(id).ok()?),
            };
            Some(ParsedClientMessage::Hello { user_id, name })
        }
        "pay" => Some(ParsedClientMessage::Pay),
        "debug_pay" => Some(ParsedClientMessage::DebugPay),
        "start" => Some(ParsedClientMessage::Start),
        "input" => {
            let raw_dir = object.get("dir")?.as_str()?;
            let dir = match raw_dir {
                "none" => None,
                other => Some(Direction::parse(other)?),
            };
            let pressed = match object.get("pressed") {
                None => true,
                Some(value) => value.as_bool()?,
            };
            Some(ParsedClientMessage::Input { dir, pressed })
        }
        "swipe" => {
            let dx = object.get("dx")?.as_f64()?;
            let dy = object.get("dy")?.as_f64()?;
            if !dx.is_finite() || !dy.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Swipe {
                dx: dx as f32,
                dy: dy as f32,
            })
        }
        "leaderboard" => {
            let limit = parse_optional_i64(object.get("limit"))?;
            Some(ParsedClientMessage::Leaderboard { limit })
        }
        _ => None,
    }
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if value.is_null() {
        return Some(None);
    }
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}
