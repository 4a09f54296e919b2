use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::source::{FetchContext, Source, SourceData, SourceError};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Hour used when the forecast has no explicit 12:00 slot.
const MIDDAY_FALLBACK_INDEX: usize = 12;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherData {
    pub location: String,
    pub temperature: f64,
    pub high_temp: f64,
    pub low_temp: f64,
    pub precipitation_chance: f64,
    pub weather_code: i32,
    pub description: String,
}

#[derive(Debug, Deserialize, Default)]
struct Forecast {
    #[serde(default)]
    hourly: Hourly,
    #[serde(default)]
    daily: Daily,
}

#[derive(Debug, Deserialize, Default)]
struct Hourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
}

#[derive(Debug, Deserialize, Default)]
struct Daily {
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

fn first_value<T: Copy + Default>(values: &[Option<T>]) -> T {
    values.first().copied().flatten().unwrap_or_default()
}

fn midday_index(times: &[String]) -> usize {
    times
        .iter()
        .position(|t| t.get(11..13) == Some("12"))
        .unwrap_or(MIDDAY_FALLBACK_INDEX)
}

impl Forecast {
    fn into_weather(self, location: &str) -> Result<WeatherData, SourceError> {
        let idx = midday_index(&self.hourly.time);
        let temperature = self
            .hourly
            .temperature_2m
            .get(idx)
            .copied()
            .flatten()
            .ok_or_else(|| SourceError::Parse("forecast has no midday temperature".into()))?;
        let weather_code = self
            .hourly
            .weather_code
            .get(idx)
            .copied()
            .flatten()
            .unwrap_or_default();

        Ok(WeatherData {
            location: location.to_string(),
            temperature,
            high_temp: first_value(&self.daily.temperature_2m_max),
            low_temp: first_value(&self.daily.temperature_2m_min),
            precipitation_chance: first_value(&self.daily.precipitation_probability_max),
            weather_code,
            description: weather_description(weather_code).to_string(),
        })
    }
}

/// Human label for a WMO weather interpretation code.
pub fn weather_description(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Foggy",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 => "Light rain",
        63 => "Rain",
        65 => "Heavy rain",
        66 | 67 => "Freezing rain",
        71 => "Light snow",
        73 => "Snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown",
    }
}

/// Today's midday forecast for one location.
pub struct Weather {
    client: Client,
    latitude: f64,
    longitude: f64,
    location: String,
    base_url: String,
}

impl Weather {
    pub fn new(client: Client, latitude: f64, longitude: f64, location: impl Into<String>) -> Self {
        Self::with_base_url(client, latitude, longitude, location, OPEN_METEO_URL)
    }

    pub fn with_base_url(
        client: Client,
        latitude: f64,
        longitude: f64,
        location: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            latitude,
            longitude,
            location: location.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Source for Weather {
    fn name(&self) -> &str {
        "Weather"
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<SourceData, SourceError> {
        let latitude = format!("{:.4}", self.latitude);
        let longitude = format!("{:.4}", self.longitude);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("hourly", "temperature_2m,weather_code"),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min,precipitation_probability_max",
                ),
                ("timezone", "auto"),
                ("forecast_days", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                service: "Weather API",
                status: status.as_u16(),
            });
        }

        let forecast: Forecast = response.json().await?;
        Ok(SourceData::Weather(forecast.into_weather(&self.location)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hours() -> Vec<String> {
        (0..24).map(|h| format!("2026-03-10T{:02}:00", h)).collect()
    }

    #[test]
    fn test_midday_index() {
        assert_eq!(midday_index(&hours()), 12);
        let shifted: Vec<String> = (6..24).map(|h| format!("2026-03-10T{:02}:00", h)).collect();
        assert_eq!(midday_index(&shifted), 6);
        assert_eq!(midday_index(&[]), MIDDAY_FALLBACK_INDEX);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(weather_description(0), "Clear sky");
        assert_eq!(weather_description(81), "Rain showers");
        assert_eq!(weather_description(99), "Thunderstorm with hail");
        assert_eq!(weather_description(1234), "Unknown");
    }

    #[tokio::test]
    async fn test_fetches_midday_conditions() {
        let temps: Vec<f64> = (0..24).map(|h| h as f64).collect();
        let mut codes = vec![0; 24];
        codes[12] = 61;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("latitude", "47.6062"))
            .and(query_param("longitude", "-122.3321"))
            .and(query_param("forecast_days", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourly": {"time": hours(), "temperature_2m": temps, "weather_code": codes},
                "daily": {
                    "temperature_2m_max": [16.5],
                    "temperature_2m_min": [3.0],
                    "precipitation_probability_max": [70]
                }
            })))
            .mount(&server)
            .await;

        let source =
            Weather::with_base_url(Client::new(), 47.6062, -122.3321, "Seattle", server.uri());
        let data = source
            .fetch(&FetchContext::with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();

        let SourceData::Weather(weather) = data else {
            panic!("expected weather payload");
        };
        assert_eq!(weather.location, "Seattle");
        assert_eq!(weather.temperature, 12.0);
        assert_eq!(weather.high_temp, 16.5);
        assert_eq!(weather.low_temp, 3.0);
        assert_eq!(weather.precipitation_chance, 70.0);
        assert_eq!(weather.weather_code, 61);
        assert_eq!(weather.description, "Light rain");
    }

    #[tokio::test]
    async fn test_missing_hourly_data_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"daily": {}})))
            .mount(&server)
            .await;

        let source = Weather::with_base_url(Client::new(), 0.0, 0.0, "Nowhere", server.uri());
        let result = source
            .fetch(&FetchContext::with_timeout(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }
}
