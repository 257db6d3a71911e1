use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    PtBr,
}

const PT_BR_MONTHS: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

/// Human-readable date for notifications and emails, e.g.
/// `dia 25 de dezembro, às 14h`. Minutes are only shown when nonzero;
/// booked slots are hour-aligned so they normally are not.
pub fn format_human(ts: DateTime<Utc>, locale: Locale) -> String {
    match locale {
        Locale::PtBr => {
            let month = PT_BR_MONTHS[ts.month0() as usize];
            if ts.minute() == 0 {
                format!("dia {:02} de {}, às {}h", ts.day(), month, ts.hour())
            } else {
                format!(
                    "dia {:02} de {}, às {}:{:02}h",
                    ts.day(),
                    month,
                    ts.hour(),
                    ts.minute()
                )
            }
        }
    }
}
