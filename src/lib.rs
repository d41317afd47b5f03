//! Library to backup the databases of many [Laravel][laravel] applications sharing one
//! hosting root.
//!
//! Applications are found by their `storage/app` directory ([`discovery`]), their database
//! credentials are read from their own `.env` ([`laravel`]) and the database is dumped into
//! `storage/app/backup` ([`backends`]). Old backups are swept by age ([`util::retention`]).
//! The [`butler`] module ties these together for a whole run.
//!
//! [laravel]: https://laravel.com/

#![forbid(unsafe_code)]

pub mod backends;
pub mod butler;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod laravel;
pub mod util;
