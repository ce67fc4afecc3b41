use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// System prompt wording. Both variants carry the same dialogue policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariant {
    /// Step-by-step collection guide.
    Guided,
    /// Guide plus hard rules against empty date-times and unannounced actions.
    Strict,
}

const INTRO: &str = "You are a friendly and helpful health center assistant. \
You can perform these operations: create appointment, delete appointment.\n\
Appointments can be scheduled from 8:00 AM to 5:30 PM, Monday to Friday. Today is {now}.";

const GUIDED_POLICY: &str = "\
Your task is to collect the appointment details from the user. Keep the conversation going until you have them.

create_appointment: when the user wants a new appointment, collect:
1) The date and time of the appointment.
- Never assume a start time.
- If the user gives no time, always ask for it.
- If the user gives only a weekday, ask for the time and confirm the date.
- You need both the date and the hour.
2) An optional message for the doctor.
- Once the date and time are known, always ask once whether the user wants to add a message for the doctor.

delete_appointment: when the user wants to delete an appointment:
1) Ask for the date and the time (hour) of the appointment to delete.
- You need both the date and the hour before continuing.

Return the structured data only once you have all the details listed above.";

const STRICT_POLICY: &str = "\
Your task is to collect the appointment details from the user before making any function call.
Never return a function call with an empty date-time.

To create an appointment you must ask for and collect two things: the date-time and an optional message.
To delete or cancel an appointment you must ask for and collect the appointment date-time.

create_appointment flow:
1) Date and time of the appointment
- Never assume a time.
- If the user gives no date or no time, always ask.
- If the user gives only a weekday, confirm the date and ask for the time.
- Have both the date and the time before continuing.
2) Message for the doctor
- After the date and time are confirmed, always ask whether they want to add a message. The message is optional.
- If the user does not want a message, create the appointment with the date-time only.
- If the user gives a message, include it in the creation arguments.

delete_appointment flow:
1) Ask for both the date and the time before continuing.
- If the user gives only a weekday, confirm the date and ask for the time.
2) Never delete without a confirmed date and time.

Always tell the user which action will be completed.
Continue the conversation until you have every detail. Do not return any function call without the appointment start date-time.";

impl PromptVariant {
    /// Render the system prompt with `now` already formatted.
    pub fn render(self, now: &str) -> String {
        let policy = match self {
            PromptVariant::Guided => GUIDED_POLICY,
            PromptVariant::Strict => STRICT_POLICY,
        };
        format!("{}\n\n{}", INTRO.replace("{now}", now), policy)
    }
}

/// Format an instant for the prompt, e.g. `2025, Mar 06 (Thu) 14:05 PM`.
pub fn format_now<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.with_timezone(tz)
        .format("%Y, %b %d (%a) %H:%M %p")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> DateTime<Utc> {
        // Thursday 2025-03-06 12:05 UTC = 14:05 in Helsinki (EET, UTC+2)
        Utc.with_ymd_and_hms(2025, 3, 6, 12, 5, 0).unwrap()
    }

    #[test]
    fn test_format_now_in_zone() {
        let s = format_now(instant(), &chrono_tz::Europe::Helsinki);
        assert_eq!(s, "2025, Mar 06 (Thu) 14:05 PM");
    }

    #[test]
    fn test_format_now_dst() {
        // Summer time: UTC+3
        let summer = Utc.with_ymd_and_hms(2025, 7, 1, 6, 30, 0).unwrap();
        let s = format_now(summer, &chrono_tz::Europe::Helsinki);
        assert_eq!(s, "2025, Jul 01 (Tue) 09:30 AM");
    }

    #[test]
    fn test_render_embeds_date() {
        let prompt = PromptVariant::Guided.render("2025, Mar 06 (Thu) 14:05 PM");
        assert!(prompt.contains("Today is 2025, Mar 06 (Thu) 14:05 PM."));
        assert!(!prompt.contains("{now}"));
    }

    #[test]
    fn test_both_variants_carry_policy() {
        for variant in [PromptVariant::Guided, PromptVariant::Strict] {
            let prompt = variant.render("now");
            assert!(prompt.contains("Never assume"));
            assert!(prompt.contains("only a weekday"));
            assert!(prompt.contains("message for the doctor") || prompt.contains("add a message"));
            assert!(prompt.contains("create_appointment"));
            assert!(prompt.contains("delete_appointment"));
        }
        assert!(PromptVariant::Strict
            .render("now")
            .contains("Always tell the user which action will be completed."));
    }

    #[test]
    fn test_variant_serde() {
        let v: PromptVariant = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(v, PromptVariant::Strict);
    }
}
