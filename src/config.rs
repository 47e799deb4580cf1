use crate::geo::GeoPoint;
use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Geofence
    pub office_latitude: f64,
    pub office_longitude: f64,
    pub max_distance_meters: f64,

    // QR token lifetime
    pub qr_ttl_ms: i64,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            access_token_ttl: env::var("ACCESS_TOKEN_TTL")
                .unwrap_or_else(|_| "900".to_string()) // default 15 min
                .parse()
                .unwrap(),
            refresh_token_ttl: env::var("REFRESH_TOKEN_TTL")
                .unwrap_or_else(|_| "604800".to_string()) // default 7 days
                .parse()
                .unwrap(),

            office_latitude: env::var("OFFICE_LATITUDE")
                .expect("OFFICE_LATITUDE must be set")
                .parse()
                .expect("OFFICE_LATITUDE must be a number"),
            office_longitude: env::var("OFFICE_LONGITUDE")
                .expect("OFFICE_LONGITUDE must be set")
                .parse()
                .expect("OFFICE_LONGITUDE must be a number"),
            max_distance_meters: env::var("MAX_DISTANCE_METERS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .expect("MAX_DISTANCE_METERS must be a number"),

            qr_ttl_ms: env::var("QR_TTL_MS")
                .unwrap_or_else(|_| "30000".to_string()) // 30 seconds
                .parse()
                .expect("QR_TTL_MS must be a number"),

            rate_login_per_min: env::var("RATE_LOGIN_PER_MIN")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap(),
            rate_register_per_min: env::var("RATE_REGISTER_PER_MIN")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap(),
            rate_refresh_per_min: env::var("RATE_REFRESH_PER_MIN")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap(),
            rate_protected_per_min: env::var("RATE_PROTECTED_PER_MIN")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap(),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
        }
    }

    /// Reference coordinate for the geofence check.
    pub fn office_location(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.office_latitude,
            longitude: self.office_longitude,
        }
    }
}
