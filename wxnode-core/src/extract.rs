//! Weather field extraction from a proxied JSON body.
//!
//! Not a JSON parser: the object is located by its quoted key and brace-depth
//! counting, fields by quoted key and the first colon after it. Braces inside
//! string values and duplicate key names in nested objects are not handled.

/// Key of the object that carries the current conditions.
pub const CURRENT_WEATHER_KEY: &str = "current_weather";

/// First balanced `{...}` span following `"key"` in `json`.
pub fn extract_object<'a>(json: &'a str, key: &str) -> Option<&'a str> {
    let token = format!("\"{key}\"");
    let key_pos = json.find(&token)?;
    let brace_start = key_pos + json[key_pos..].find('{')?;
    let mut depth = 0usize;
    for (i, b) in json.as_bytes()[brace_start..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&json[brace_start..=brace_start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Value of `"field":` inside `object`: a quoted string up to the next
/// unescaped quote, or a bare token up to the next `,` or `}`.
pub fn extract_field<'a>(object: &'a str, field: &str) -> Option<&'a str> {
    let marker = format!("\"{field}\"");
    let after_key = object.find(&marker)? + marker.len();
    let colon = after_key + object[after_key..].find(':')?;
    let value = object[colon + 1..].trim_start_matches(|c: char| c.is_ascii_whitespace());
    if value.is_empty() {
        return None;
    }

    if let Some(quoted) = value.strip_prefix('"') {
        let bytes = quoted.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'"' => {
                    let text = &quoted[..i];
                    return (!text.is_empty()).then_some(text);
                }
                _ => i += 1,
            }
        }
        return None;
    }

    let end = value.find([',', '}']).unwrap_or(value.len());
    let token = value[..end].trim_matches(|c: char| c.is_ascii_whitespace());
    (!token.is_empty()).then_some(token)
}

/// Fields recovered from `current_weather`. Each is `None` when absent or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherFields {
    pub code: Option<String>,
    pub time: Option<String>,
    pub temperature: Option<String>,
    pub windspeed: Option<String>,
    pub winddirection: Option<String>,
}

impl WeatherFields {
    /// Everything the master needs except the code, which may be omitted.
    pub fn is_complete(&self) -> bool {
        self.time.is_some()
            && self.temperature.is_some()
            && self.windspeed.is_some()
            && self.winddirection.is_some()
    }

    fn any(&self) -> bool {
        self.code.is_some()
            || self.time.is_some()
            || self.temperature.is_some()
            || self.windspeed.is_some()
            || self.winddirection.is_some()
    }
}

/// Locate `current_weather` and pull its fields. `None` if the object is
/// missing or none of the fields could be read.
pub fn parse_weather_fields(body: &str) -> Option<WeatherFields> {
    let object = extract_object(body, CURRENT_WEATHER_KEY)?;
    let get = |name: &str| extract_field(object, name).map(str::to_owned);
    let fields = WeatherFields {
        code: get("weathercode"),
        time: get("time"),
        temperature: get("temperature"),
        windspeed: get("windspeed"),
        winddirection: get("winddirection"),
    };
    fields.any().then_some(fields)
}
