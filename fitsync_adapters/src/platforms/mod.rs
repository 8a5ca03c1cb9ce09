pub mod garmin;
pub mod igpsport;
pub mod intervals_icu;
pub mod onedrive;
pub mod strava;
