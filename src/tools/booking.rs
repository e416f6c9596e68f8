//! 预订工具：航班 / 酒店 / 火车的查询与预订
//!
//! 工具调用解析为 `BookingCommand` 后分派到 `BookingService`；
//! 内置 `MockBookingService` 返回固定库存与确认码，并记录已完成的预订。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::llm::ToolSpec;
use crate::memory::ToolCall;
use crate::tools::toolbox::{parse_args, spec_for};
use crate::tools::{ToolError, Toolbox};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct RouteArgs {
    /// Departure city
    pub origin: String,
    /// Arrival city
    pub destination: String,
    /// Travel date, e.g. 2025-05-01
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct HotelSearchArgs {
    /// City or area
    pub location: String,
    /// Check-in date
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct FlightIdArgs {
    pub flight_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct HotelIdArgs {
    pub hotel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct TrainIdArgs {
    pub train_id: String,
}

/// 预订 Worker 的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingCommand {
    SearchFlights(RouteArgs),
    BookFlight(FlightIdArgs),
    SearchHotels(HotelSearchArgs),
    BookHotel(HotelIdArgs),
    SearchTrains(RouteArgs),
    BookTrain(TrainIdArgs),
}

impl BookingCommand {
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        match call.name.as_str() {
            "search_flights" => Ok(Self::SearchFlights(parse_args(call)?)),
            "book_flight" => Ok(Self::BookFlight(parse_args(call)?)),
            "search_hotels" => Ok(Self::SearchHotels(parse_args(call)?)),
            "book_hotel" => Ok(Self::BookHotel(parse_args(call)?)),
            "search_trains" => Ok(Self::SearchTrains(parse_args(call)?)),
            "book_train" => Ok(Self::BookTrain(parse_args(call)?)),
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }

    pub fn specs() -> Vec<ToolSpec> {
        vec![
            spec_for::<RouteArgs>("search_flights", "Search flights between two cities on a date."),
            spec_for::<FlightIdArgs>("book_flight", "Book a flight by the id returned from search_flights."),
            spec_for::<HotelSearchArgs>("search_hotels", "Search hotels in a location for a date."),
            spec_for::<HotelIdArgs>("book_hotel", "Book a hotel by the id returned from search_hotels."),
            spec_for::<RouteArgs>("search_trains", "Search trains between two cities on a date."),
            spec_for::<TrainIdArgs>("book_train", "Book a train by the id returned from search_trains."),
        ]
    }
}

/// 预订后端
#[async_trait]
pub trait BookingService: Send + Sync {
    async fn search_flights(&self, args: &RouteArgs) -> Result<String, String>;
    async fn book_flight(&self, flight_id: &str) -> Result<String, String>;
    async fn search_hotels(&self, args: &HotelSearchArgs) -> Result<String, String>;
    async fn book_hotel(&self, hotel_id: &str) -> Result<String, String>;
    async fn search_trains(&self, args: &RouteArgs) -> Result<String, String>;
    async fn book_train(&self, train_id: &str) -> Result<String, String>;
}

const FLIGHTS: [(&str, &str, u32); 3] = [
    ("AI-101", "08:00 AM - 10:00 AM", 150),
    ("BA-202", "12:00 PM - 02:00 PM", 180),
    ("CD-303", "06:00 PM - 08:00 PM", 120),
];

const HOTELS: [(&str, &str, u32, u32); 3] = [
    ("HTL-GP", "Grand Plaza", 5, 200),
    ("HTL-CS", "City Stay", 4, 120),
    ("HTL-BI", "Budget Inn", 3, 80),
];

const TRAINS: [(&str, &str, u32); 3] = [
    ("EXP-101", "09:00 AM - 12:00 PM", 50),
    ("ICT-202", "01:00 PM - 04:00 PM", 45),
    ("NR-303", "10:00 PM - 06:00 AM", 40),
];

/// 固定库存的模拟预订服务
#[derive(Default)]
pub struct MockBookingService {
    bookings: RwLock<Vec<String>>,
}

impl MockBookingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已确认的预订（确认码）
    pub async fn bookings(&self) -> Vec<String> {
        self.bookings.read().await.clone()
    }

    async fn confirm(&self, kind: &str, id: &str, known: bool, code: &str) -> Result<String, String> {
        if !known {
            return Err(format!("no {} with id {}", kind, id));
        }
        self.bookings.write().await.push(code.to_string());
        Ok(format!("Successfully booked {} {}. Confirmation code: {}.", kind, id, code))
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

#[async_trait]
impl BookingService for MockBookingService {
    async fn search_flights(&self, args: &RouteArgs) -> Result<String, String> {
        require("origin", &args.origin)?;
        require("destination", &args.destination)?;
        let lines: Vec<String> = FLIGHTS
            .iter()
            .enumerate()
            .map(|(i, (id, time, price))| format!("{}. Flight {}: {}, Price: ${}", i + 1, id, time, price))
            .collect();
        Ok(format!(
            "Found {} flights from {} to {} on {}:\n{}",
            lines.len(),
            args.origin,
            args.destination,
            args.date,
            lines.join("\n")
        ))
    }

    async fn book_flight(&self, flight_id: &str) -> Result<String, String> {
        let known = FLIGHTS.iter().any(|(id, _, _)| *id == flight_id);
        self.confirm("flight", flight_id, known, "PRE-12345").await
    }

    async fn search_hotels(&self, args: &HotelSearchArgs) -> Result<String, String> {
        require("location", &args.location)?;
        let lines: Vec<String> = HOTELS
            .iter()
            .enumerate()
            .map(|(i, (id, name, stars, price))| {
                format!("{}. {} ({}): {} stars, ${}/night", i + 1, name, id, stars, price)
            })
            .collect();
        Ok(format!(
            "Found {} hotels in {} for {}:\n{}",
            lines.len(),
            args.location,
            args.date,
            lines.join("\n")
        ))
    }

    async fn book_hotel(&self, hotel_id: &str) -> Result<String, String> {
        let known = HOTELS.iter().any(|(id, _, _, _)| *id == hotel_id);
        self.confirm("hotel", hotel_id, known, "HTL-67890").await
    }

    async fn search_trains(&self, args: &RouteArgs) -> Result<String, String> {
        require("origin", &args.origin)?;
        require("destination", &args.destination)?;
        let lines: Vec<String> = TRAINS
            .iter()
            .enumerate()
            .map(|(i, (id, time, price))| format!("{}. Train {}: {}, Price: ${}", i + 1, id, time, price))
            .collect();
        Ok(format!(
            "Found {} trains from {} to {} on {}:\n{}",
            lines.len(),
            args.origin,
            args.destination,
            args.date,
            lines.join("\n")
        ))
    }

    async fn book_train(&self, train_id: &str) -> Result<String, String> {
        let known = TRAINS.iter().any(|(id, _, _)| *id == train_id);
        self.confirm("train", train_id, known, "TRN-54321").await
    }
}

/// 预订 Worker 的工具箱
pub struct BookingToolbox {
    service: Arc<dyn BookingService>,
}

impl BookingToolbox {
    pub fn new(service: Arc<dyn BookingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Toolbox for BookingToolbox {
    fn specs(&self) -> Vec<ToolSpec> {
        BookingCommand::specs()
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let result = match BookingCommand::parse(call)? {
            BookingCommand::SearchFlights(a) => self.service.search_flights(&a).await,
            BookingCommand::BookFlight(a) => self.service.book_flight(&a.flight_id).await,
            BookingCommand::SearchHotels(a) => self.service.search_hotels(&a).await,
            BookingCommand::BookHotel(a) => self.service.book_hotel(&a.hotel_id).await,
            BookingCommand::SearchTrains(a) => self.service.search_trains(&a).await,
            BookingCommand::BookTrain(a) => self.service.book_train(&a.train_id).await,
        };
        result.map_err(ToolError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_search_then_book_hotel() {
        let service = Arc::new(MockBookingService::new());
        let toolbox = BookingToolbox::new(service.clone());
        let found = toolbox
            .invoke(&ToolCall::new("c1", "search_hotels", json!({"location": "Porto", "date": "2025-05-01"})))
            .await
            .unwrap();
        assert!(found.contains("City Stay (HTL-CS)"));

        let booked = toolbox
            .invoke(&ToolCall::new("c2", "book_hotel", json!({"hotel_id": "HTL-CS"})))
            .await
            .unwrap();
        assert!(booked.contains("HTL-67890"));
        assert_eq!(service.bookings().await, vec!["HTL-67890".to_string()]);
    }

    #[tokio::test]
    async fn test_book_unknown_flight_fails() {
        let toolbox = BookingToolbox::new(Arc::new(MockBookingService::new()));
        let err = toolbox
            .invoke(&ToolCall::new("c1", "book_flight", json!({"flight_id": "ZZ-999"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no flight with id ZZ-999");
    }

    #[test]
    fn test_missing_argument_is_invalid() {
        let err = BookingCommand::parse(&ToolCall::new("c", "search_trains", json!({"origin": "Lisbon"})))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert_eq!(BookingCommand::specs().len(), 6);
    }
}
