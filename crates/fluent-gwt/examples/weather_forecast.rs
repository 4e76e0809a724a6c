//! Weather forecast acceptance scenarios.
//!
//! Run with: `cargo run -p fluent-gwt --example weather_forecast`
//!
//! Runs a small suite against an in-memory weather service and prints the
//! suite report, including every recorded given and captured value.

use fluent_gwt::prelude::*;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Forecasts(HashMap<String, String>);

#[derive(Debug, Default)]
struct StubWeatherProvider {
    city: String,
    description: String,
}

impl StubWeatherProvider {
    fn city(&mut self, city: &str) -> &mut Self {
        self.city = city.to_string();
        self
    }

    fn description(&mut self, description: &str) -> &mut Self {
        self.description = description.to_string();
        self
    }
}

impl Precondition<Forecasts> for StubWeatherProvider {
    fn prime(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        forecasts: &mut Forecasts,
    ) -> Result<(), BoxError> {
        items.add_to_givens("City", json!(self.city));
        items.add_to_givens("Weather description", json!(self.description));
        forecasts
            .0
            .insert(self.city.clone(), self.description.clone());
        Ok(())
    }
}

struct RequestWeather(&'static str);

impl When<Forecasts> for RequestWeather {
    type Request = String;
    type Response = String;

    fn request(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        _: &mut Forecasts,
    ) -> Result<Option<String>, BoxError> {
        items.add_to_captured_inputs_and_outputs("City requested", json!(self.0));
        Ok(Some(self.0.to_string()))
    }

    fn response(
        &mut self,
        city: String,
        items: &mut dyn WriteOnlyTestItems,
        forecasts: &mut Forecasts,
    ) -> Result<Option<String>, BoxError> {
        let description = forecasts
            .0
            .get(&city)
            .ok_or_else(|| format!("no forecast for {city}"))?;
        let text = format!("There is {description} in {city}");
        items.add_to_captured_inputs_and_outputs("Response", json!(text));
        Ok(Some(text))
    }
}

fn main() -> GwtResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter("fluent_gwt=debug")
        .init();

    let mut suite = SuiteReport::new("weather forecast");

    suite.run(
        "light rain in London",
        FluentTest::with_config(FluentConfig::deferred(), Forecasts::default()),
        |test| {
            test.given(StubWeatherProvider::default())?
                .city("London")
                .description("light rain");
            test.when(RequestWeather("London"))?;
            test.then(|text| assert_eq!(text, "There is light rain in London"))?;
            Ok(())
        },
    );

    suite.run("unknown city", FluentTest::new(Forecasts::default()), |test| {
        test.when(RequestWeather("Atlantis"))?;
        test.then(|text| assert!(!text.is_empty()))?;
        Ok(())
    });

    println!("{}", suite.summary());
    for failure in suite.failures() {
        println!(
            "  {} failed at {}: {}",
            failure.name,
            failure.stage,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("{}", suite.to_json()?);
    Ok(())
}
