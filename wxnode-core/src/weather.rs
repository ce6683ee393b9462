//! Weather request URL and the state sink that turns published weather text
//! into a Weather record for the master.

use std::sync::Arc;

use tracing::warn;

use crate::codec;
use crate::node::MasterLink;
use crate::pipeline::{PublishError, StateSink};
use crate::state::{TypedMessage, WeatherState};
use crate::transport::Transport;

pub const OPEN_METEO_BASE: &str = "https://api.open-meteo.com/v1/forecast";

/// Jakarta Pusat.
pub const DEFAULT_LATITUDE: f64 = -6.1805;
pub const DEFAULT_LONGITUDE: f64 = 106.8283;

/// Open-Meteo current-weather URL, coordinates with 7 decimals.
pub fn current_weather_url(latitude: f64, longitude: f64) -> String {
    format!(
        "{OPEN_METEO_BASE}?latitude={latitude:.7}&longitude={longitude:.7}&current_weather=true"
    )
}

/// Map `state=weather|---|...` text onto a Weather record.
///
/// `ok` is true for `1`, `true` or `ok`. Decimal fields are scaled by 10 and
/// rounded; integers keep their leading digits. Unparseable numbers become 0.
pub fn weather_state_from_text(payload: &str) -> Result<WeatherState, PublishError> {
    if codec::get_field(payload, "state") != Some("weather") {
        return Err(PublishError::NotWeather);
    }
    let field = |key: &str| codec::get_field(payload, key);

    let (Some(time), Some(temperature), Some(windspeed), Some(winddirection)) = (
        field("time"),
        field("temperature"),
        field("windspeed"),
        field("winddirection"),
    ) else {
        warn!("skip weather send: incomplete parsed fields");
        return Err(PublishError::Incomplete);
    };

    Ok(WeatherState {
        ok: matches!(field("ok"), Some("1" | "true" | "ok")),
        code: leading_int(field("code").unwrap_or_default()) as i16,
        time: time.to_owned(),
        temperature10: scaled10(temperature),
        windspeed10: scaled10(windspeed),
        winddirection: leading_int(winddirection) as u16,
    })
}

fn scaled10(text: &str) -> i16 {
    text.parse::<f64>()
        .map(|v| (v * 10.0).round() as i16)
        .unwrap_or(0)
}

fn leading_int(text: &str) -> i64 {
    let text = text.trim();
    let digits_end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    text[..digits_end].parse().unwrap_or(0)
}

/// Publishes weather text to the bound master as a binary Weather record.
pub struct WeatherStateSink<T> {
    link: Arc<MasterLink<T>>,
}

impl<T> WeatherStateSink<T> {
    pub fn new(link: Arc<MasterLink<T>>) -> Self {
        Self { link }
    }
}

impl<T: Transport> StateSink for WeatherStateSink<T> {
    fn publish_state(&self, payload: &str) -> Result<(), PublishError> {
        let state = weather_state_from_text(payload)?;
        self.link.send_state(&state.encode())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "state=weather|---|ok=1|---|code=3|---|time=2024-05-01T10:00|---|temperature=25.1|---|windspeed=4.2|---|winddirection=180";

    #[test]
    fn url_format() {
        assert_eq!(
            current_weather_url(-6.1805, 106.8283),
            "https://api.open-meteo.com/v1/forecast?latitude=-6.1805000&longitude=106.8283000&current_weather=true"
        );
    }

    #[test]
    fn text_to_weather_state() {
        let s = weather_state_from_text(TEXT).unwrap();
        assert!(s.ok);
        assert_eq!(s.code, 3);
        assert_eq!(s.time, "2024-05-01T10:00");
        assert_eq!(s.temperature10, 251);
        assert_eq!(s.windspeed10, 42);
        assert_eq!(s.winddirection, 180);
    }

    #[test]
    fn ok_spellings() {
        for (ok, expected) in [("1", true), ("true", true), ("ok", true), ("0", false)] {
            let text = TEXT.replace("ok=1", &format!("ok={ok}"));
            assert_eq!(weather_state_from_text(&text).unwrap().ok, expected, "{ok}");
        }
    }

    #[test]
    fn missing_code_defaults_to_zero() {
        let text = TEXT.replace("|---|code=3", "");
        assert_eq!(weather_state_from_text(&text).unwrap().code, 0);
    }

    #[test]
    fn negative_and_odd_numbers() {
        let text = TEXT
            .replace("temperature=25.1", "temperature=-3.7")
            .replace("winddirection=180", "winddirection=90.6deg");
        let s = weather_state_from_text(&text).unwrap();
        assert_eq!(s.temperature10, -37);
        assert_eq!(s.winddirection, 90);
    }

    #[test]
    fn non_weather_rejected() {
        assert!(matches!(
            weather_state_from_text("state=proxy_req|---|url=x"),
            Err(PublishError::NotWeather)
        ));
    }

    #[test]
    fn incomplete_rejected() {
        let text = TEXT.replace("|---|windspeed=4.2", "");
        assert!(matches!(
            weather_state_from_text(&text),
            Err(PublishError::Incomplete)
        ));
    }

    #[test]
    fn leading_int_parsing() {
        assert_eq!(leading_int("180"), 180);
        assert_eq!(leading_int("-12abc"), -12);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int(""), 0);
    }
}
