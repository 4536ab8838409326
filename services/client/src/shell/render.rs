//! services/client/src/shell/render.rs
//!
//! Turns the current screen into text for the terminal.

use vaccimap_core::{
    AuthState, DashboardState, MapState, OnboardingFlow, Profile, Screen, VaccinationCenter,
    VaccinationSchedule,
};

pub fn render(screen: &Screen) -> String {
    let lines = match screen {
        Screen::Initializing => vec!["Loading...".to_string()],
        Screen::StartupFailed { reason } => vec![
            format!("Could not start: {}", reason),
            "Type 'retry' to try again.".to_string(),
        ],
        Screen::Login(flow) => render_login(flow.state()),
        Screen::Onboarding(flow) => render_onboarding(flow),
        Screen::Dashboard(dashboard) => {
            let mut lines = vec!["== VacciMap Dashboard ==".to_string()];
            match (dashboard.state(), dashboard.profile()) {
                (DashboardState::Loading, _) => lines.push("Loading Dashboard...".to_string()),
                (DashboardState::LoadFailed, _) => {
                    lines.push("The dashboard could not be loaded. Type 'retry' to try again.".to_string())
                }
                (_, Some(profile)) => {
                    lines.extend(render_profile(profile));
                    lines.extend(render_schedule(dashboard.schedule()));
                    lines.extend(render_map(dashboard.map(), dashboard.nearest_center()));
                }
                (_, None) => {}
            }
            lines
        }
        Screen::ProfileUnavailable { session, reason } => vec![
            format!(
                "Signed in as {}, but your profile could not be loaded: {}",
                session.phone_number, reason
            ),
            "Type 'retry' to try again.".to_string(),
        ],
    };
    lines.join("\n")
}

fn render_login(state: &AuthState) -> Vec<String> {
    let mut lines = vec!["== VacciMap Login ==".to_string()];
    lines.push(match state {
        AuthState::EnteringPhone => {
            "Enter your phone number in E.164 format, e.g. 'phone +91 9876543210'".to_string()
        }
        AuthState::SendingCode { phone } => format!("Sending a code to {}...", phone),
        AuthState::CodeSent { phone, .. } => format!(
            "OTP has been sent to {}. Enter it with 'code <otp>', or 'change-number'.",
            phone
        ),
        AuthState::Verifying { .. } => "Verifying...".to_string(),
        AuthState::Resolved(_) => "Phone authentication successful! Checking profile...".to_string(),
    });
    lines
}

fn render_onboarding(flow: &OnboardingFlow) -> Vec<String> {
    let form = flow.form();
    let or_dash = |value: &str| {
        if value.trim().is_empty() {
            "-".to_string()
        } else {
            value.to_string()
        }
    };
    let home = match &form.home_location {
        Some(fix) => format!(
            "({:.5}, {:.5})",
            fix.coordinates.latitude, fix.coordinates.longitude
        ),
        None => "not captured (type 'locate')".to_string(),
    };
    vec![
        "== Complete Your Profile ==".to_string(),
        format!("Mobile:        {}", flow.session().phone_number),
        format!("Parent Name:   {}", or_dash(&form.parent_name)),
        format!("Child Name:    {}", or_dash(&form.child_name)),
        format!(
            "Child DOB:     {}",
            form.child_dob
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("Home location: {}", home),
        "Type 'save' to save your profile and continue.".to_string(),
    ]
}

pub fn render_profile(profile: &Profile) -> Vec<String> {
    vec![
        format!("Parent: {}", profile.parent_name),
        format!("Child:  {}", profile.child_name),
        format!("DOB:    {}", profile.child_dob.format("%Y-%m-%d")),
        format!("Mobile: {}", profile.phone_number),
    ]
}

pub fn render_schedule(schedule: &VaccinationSchedule) -> Vec<String> {
    let mut lines = vec![String::new(), "Vaccination Status".to_string()];
    for (vaccine, done) in &schedule.status {
        lines.push(format!(
            "  {:<14}{}",
            vaccine.to_uppercase(),
            if *done { "Done" } else { "Pending" }
        ));
    }
    lines.push(String::new());
    lines.push("Upcoming Vaccines".to_string());
    if schedule.upcoming.is_empty() {
        lines.push("  Nothing scheduled.".to_string());
    }
    for dose in &schedule.upcoming {
        lines.push(format!("  {} (Due: {})", dose.vaccine, dose.date.format("%Y-%m-%d")));
    }
    lines
}

pub fn render_map(map: &MapState, nearest: Option<(&VaccinationCenter, f64)>) -> Vec<String> {
    let mut lines = vec![String::new(), "Nearest Vaccine Center".to_string()];
    match map {
        MapState::Locating => lines.push("  Getting your location...".to_string()),
        MapState::Unavailable(reason) => lines.push(format!("  {}", reason)),
        MapState::Located(fix) => {
            lines.push(format!(
                "  You are at ({:.5}, {:.5})",
                fix.coordinates.latitude, fix.coordinates.longitude
            ));
            match nearest {
                Some((center, km)) => {
                    lines.push(format!("  {} ({:.1} km away)", center.name, km));
                    if !center.description.is_empty() {
                        lines.push(format!("  {}", center.description));
                    }
                }
                None => lines.push("  No vaccination centers are listed.".to_string()),
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use vaccimap_core::{
        ChallengeId, Coordinates, LocationFix, PhoneNumber, SubjectId, UpcomingDose,
    };

    fn schedule() -> VaccinationSchedule {
        VaccinationSchedule {
            status: vec![("dtp".to_string(), false), ("bcg".to_string(), true)],
            upcoming: vec![UpcomingDose {
                vaccine: "DTP (2nd dose)".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 11, 20).unwrap(),
            }],
            centers: vec![VaccinationCenter {
                name: "VacciMap Polio Center".to_string(),
                description: "Nearest vaccination center".to_string(),
                coordinates: Coordinates::new(12.8245, 80.045),
            }],
        }
    }

    #[test]
    fn schedule_shows_status_and_due_dates() {
        let text = render_schedule(&schedule()).join("\n");
        assert!(text.contains("BCG           Done"));
        assert!(text.contains("DTP           Pending"));
        assert!(text.find("DTP").unwrap() < text.find("BCG").unwrap());
        assert!(text.contains("DTP (2nd dose) (Due: 2025-11-20)"));
    }

    #[test]
    fn map_shows_nearest_center_or_reason() {
        let schedule = schedule();
        let fix = LocationFix {
            coordinates: Coordinates::new(12.9, 80.1),
            captured_at: Utc::now(),
        };
        let nearest = schedule.nearest_center(&fix.coordinates);
        let text = render_map(&MapState::Located(fix), nearest).join("\n");
        assert!(text.contains("VacciMap Polio Center ("));
        assert!(text.contains("km away"));

        let denied = render_map(&MapState::Unavailable("Permission to access location was denied".into()), None);
        assert!(denied.join("\n").contains("Permission to access location was denied"));
    }

    #[test]
    fn profile_card_lists_identity_fields() {
        let now = Utc::now();
        let profile = Profile {
            subject_id: SubjectId::new(),
            phone_number: PhoneNumber::parse("+919876543210").unwrap(),
            parent_name: "Meena".to_string(),
            child_name: "Kavin".to_string(),
            child_dob: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            home_location: Coordinates::new(13.0, 80.2),
            created_at: now,
            updated_at: now,
        };
        let text = render_profile(&profile).join("\n");
        assert!(text.contains("Parent: Meena"));
        assert!(text.contains("DOB:    2024-03-14"));
        assert!(text.contains("Mobile: +919876543210"));
    }

    #[test]
    fn login_prompt_follows_the_auth_state() {
        let phone = PhoneNumber::parse("+15551234567").unwrap();
        let sent = render_login(&AuthState::CodeSent {
            phone,
            challenge: ChallengeId("abc123".to_string()),
        });
        assert!(sent[1].contains("OTP has been sent to +15551234567"));
        assert!(render_login(&AuthState::EnteringPhone)[1].contains("E.164"));
        assert_eq!(render(&Screen::Initializing), "Loading...");
    }
}
