//! Benchmark suite for the booking workflow
//!
//! ```bash
//! cargo bench
//! ```
//!
//! Journals are generated in memory: each booking gets its own week on one
//! of 50 properties, opens an intent and is confirmed, so every row takes
//! the full path through identity, calendar, processor and reconciler.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rental_booking_engine::core::FixedClock;
use rental_booking_engine::io::{write_bookings_csv, JournalEntry, JournalReader};
use rental_booking_engine::replay::JournalReplay;
use rental_booking_engine::types::BookingForm;
use rental_booking_engine::EngineConfig;
use rust_decimal::Decimal;
use std::sync::Arc;

const PROPERTIES: u64 = 50;

fn main() {
    divan::main();
}

fn replay() -> JournalReplay {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap());
    JournalReplay::new(EngineConfig::default(), Arc::new(clock))
}

fn journal(bookings: u64) -> Vec<JournalEntry> {
    let start = NaiveDate::from_ymd_opt(2031, 2, 1).unwrap();
    let mut entries: Vec<JournalEntry> = (1..=PROPERTIES)
        .map(|id| JournalEntry::Property {
            id,
            title: format!("Property {}", id),
            nightly_rate: Decimal::new(9950, 2),
            max_guests: 4,
            bookable: true,
        })
        .collect();

    for reference in 1..=bookings {
        let week = (reference / PROPERTIES) as i64;
        let check_in = start + Duration::days(week * 7);
        entries.push(JournalEntry::Book {
            reference,
            form: BookingForm {
                property_id: reference % PROPERTIES + 1,
                check_in_date: check_in,
                check_out_date: check_in + Duration::days(5),
                guests: 2,
                guest_name: format!("Guest {}", reference),
                guest_email: format!("guest{}@example.com", reference),
                guest_phone: "+15550000000".to_string(),
                special_requests: None,
            },
            birthday: NaiveDate::from_ymd_opt(1990, 1, 1),
        });
        entries.push(JournalEntry::Intent { reference });
        entries.push(JournalEntry::Confirm {
            reference,
            payment_method: Some("pm_card_visa".to_string()),
        });
    }
    entries
}

#[divan::bench(args = [100, 1_000])]
fn replay_guest_payments(bencher: divan::Bencher, bookings: u64) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");

    bencher
        .with_inputs(|| journal(bookings))
        .bench_values(|entries| {
            let records = runtime.block_on(replay().replay(entries.into_iter().map(Ok)));
            let mut output = Vec::new();
            write_bookings_csv(&records, &mut output).expect("write");
            output
        });
}

#[divan::bench]
fn parse_journal(bencher: divan::Bencher) {
    let mut text = String::from(
        "op,booking,property,check_in,check_out,guests,name,email,phone,birthday,amount,status\n",
    );
    for reference in 1..=1_000u64 {
        text.push_str(&format!(
            "book,{r},7,2031-06-01,2031-06-07,2,Guest {r},guest{r}@example.com,+1555,1990-01-01,,\n\
             intent,{r}\n\
             confirm,{r},,,,,,,,,,pm_card_visa\n",
            r = reference
        ));
    }

    bencher.bench(|| {
        JournalReader::from_reader(text.as_bytes())
            .filter(Result::is_ok)
            .count()
    });
}
