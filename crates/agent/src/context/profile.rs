//! Family context: caregiver profile, children, stored knowledge and routines.
//!
//! Renders two text blocks for the prompt. Ages and developmental stage are
//! derived from each child's birthdate relative to `today`. Missing optional
//! values render as `N/A`.

use chrono::{Datelike, NaiveDate};
use lumi_core::error::StoreError;
use lumi_core::family::{ChildProfile, StoredKnowledge, StoredRoutine, or_na};
use lumi_core::store::Stores;
use std::fmt::Write as _;
use tracing::debug;

/// Coarse age band used to tailor answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevelopmentalStage {
    Infant,
    Baby,
    Toddler,
    Preschool,
    SchoolAge,
    Adolescent,
}

impl DevelopmentalStage {
    /// Classify by age; each band includes its upper bound.
    pub fn classify(years: i32, months: i32) -> Self {
        if months <= 6 {
            Self::Infant
        } else if months <= 12 {
            Self::Baby
        } else if months <= 24 {
            Self::Toddler
        } else if years <= 5 {
            Self::Preschool
        } else if years <= 12 {
            Self::SchoolAge
        } else {
            Self::Adolescent
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Infant => "lactante",
            Self::Baby => "bebé",
            Self::Toddler => "caminador/toddler",
            Self::Preschool => "preescolar",
            Self::SchoolAge => "escolar",
            Self::Adolescent => "adolescente",
        }
    }
}

/// Whole years between `birth` and `today` by calendar difference.
pub fn age_in_years(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0)
}

/// Whole elapsed months between `birth` and `today`, truncated.
pub fn age_in_months(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut months =
        (today.year() - birth.year()) * 12 + today.month() as i32 - birth.month() as i32;
    if today.day() < birth.day() {
        months -= 1;
    }
    months.max(0)
}

/// Rendered family context for one user.
#[derive(Debug, Clone, Default)]
pub struct ProfileContext {
    /// Profile lines, child lines and stored knowledge.
    pub user_context: String,
    /// Routines per child.
    pub routines: String,
    /// The children as loaded, reused by the detectors.
    pub babies: Vec<ChildProfile>,
}

/// Loads and renders the family context.
pub struct ProfileContextBuilder {
    stores: Stores,
}

impl ProfileContextBuilder {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Load everything for `user_id` and render it. Store errors propagate.
    pub async fn build(&self, user_id: &str, today: NaiveDate) -> Result<ProfileContext, StoreError> {
        let (profiles, babies, knowledge, routines) = futures::try_join!(
            self.stores.profiles.profiles_for_user(user_id),
            self.stores.profiles.babies_for_user(user_id),
            self.stores.knowledge.knowledge_for_user(user_id),
            self.stores.routines.routines_for_user(user_id),
        )?;

        debug!(
            user_id,
            profiles = profiles.len(),
            babies = babies.len(),
            knowledge = knowledge.len(),
            routines = routines.len(),
            "Family context loaded"
        );

        let profile_lines: Vec<String> = profiles
            .iter()
            .map(|p| {
                format!(
                    "- Perfil: {}, fecha de nacimiento {}, alimentación: {}",
                    or_na(p.name.as_deref()),
                    or_na(p.birthdate.as_deref()),
                    or_na(p.feeding.as_deref()),
                )
            })
            .collect();

        let baby_lines: Vec<String> = babies.iter().map(|b| render_baby(b, today)).collect();

        let mut context = String::new();
        if !profile_lines.is_empty() {
            context.push_str("Perfiles:\n");
            context.push_str(&profile_lines.join("\n"));
            context.push_str("\n\n");
        }
        if !baby_lines.is_empty() {
            context.push_str("Bebés:\n");
            context.push_str(&baby_lines.join("\n"));
            context.push_str("\n\n");
        }
        let knowledge_text = render_knowledge(&knowledge, &babies);
        if !knowledge_text.is_empty() {
            context.push_str(&knowledge_text);
            context.push_str("\n\n");
        }

        Ok(ProfileContext {
            user_context: context.trim().to_string(),
            routines: render_routines(&routines, &babies).trim().to_string(),
            babies,
        })
    }
}

fn render_baby(baby: &ChildProfile, today: NaiveDate) -> String {
    let years = age_in_years(baby.birthdate, today);
    let months = age_in_months(baby.birthdate, today);
    let stage = DevelopmentalStage::classify(years, months);
    format!(
        "- Bebé: {}, fecha de nacimiento {}, edad: {} años ({} meses aprox.), \
         etapa de desarrollo: {}, alimentación: {}, peso: {} kg, altura: {} cm",
        baby.name,
        baby.birthdate.format("%Y-%m-%d"),
        years,
        months,
        stage.label(),
        or_na(baby.feeding_mode.as_deref()),
        or_na(baby.weight_kg),
        or_na(baby.height_cm),
    )
}

fn baby_label<'a>(baby_id: &'a str, babies: &'a [ChildProfile]) -> &'a str {
    babies
        .iter()
        .find(|b| b.id == baby_id)
        .map(|b| b.name.as_str())
        .unwrap_or(baby_id)
}

/// Group knowledge by child, in the children's order.
fn render_knowledge(knowledge: &[StoredKnowledge], babies: &[ChildProfile]) -> String {
    if knowledge.is_empty() {
        return String::new();
    }

    let mut baby_ids: Vec<&str> = babies.iter().map(|b| b.id.as_str()).collect();
    for k in knowledge {
        if !baby_ids.contains(&k.baby_id.as_str()) {
            baby_ids.push(&k.baby_id);
        }
    }

    let mut out = String::from("Conocimiento específico:");
    for baby_id in baby_ids {
        let items: Vec<&StoredKnowledge> =
            knowledge.iter().filter(|k| k.baby_id == baby_id).collect();
        if items.is_empty() {
            continue;
        }
        let _ = write!(out, "\n{}:", baby_label(baby_id, babies));
        for item in items {
            let record = &item.record;
            let category = match &record.subcategory {
                Some(sub) => format!("{} / {}", record.category, sub),
                None => record.category.clone(),
            };
            let _ = write!(
                out,
                "\n- [{}] {}: {} (importancia: {})",
                category, record.title, record.description, record.importance_level
            );
        }
    }
    out
}

/// One block per child: its routines, or an explicit "none" line.
fn render_routines(routines: &[StoredRoutine], babies: &[ChildProfile]) -> String {
    let mut out = String::new();
    for baby in babies {
        let own: Vec<&StoredRoutine> = routines.iter().filter(|r| r.baby_id == baby.id).collect();
        if own.is_empty() {
            let _ = writeln!(out, "{}: sin rutinas registradas", baby.name);
            continue;
        }
        let _ = writeln!(out, "{}:", baby.name);
        for routine in own {
            let _ = writeln!(out, "- {} ({})", routine.routine_name, routine.context_summary);
            for activity in &routine.activities {
                match activity.duration_minutes {
                    Some(minutes) => {
                        let _ = writeln!(
                            out,
                            "  - {} {} ({} min)",
                            activity.time, activity.activity, minutes
                        );
                    }
                    None => {
                        let _ = writeln!(out, "  - {} {}", activity.time, activity.activity);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumi_core::family::{KnowledgeRecord, ParentProfile, RoutineActivity, RoutineProposal};
    use lumi_core::store::{KnowledgeStore, RoutineStore};
    use lumi_store::InMemoryStore;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn ages_truncate() {
        let birth = date(2023, 5, 20);
        assert_eq!(age_in_years(birth, date(2024, 5, 19)), 0);
        assert_eq!(age_in_years(birth, date(2024, 5, 20)), 1);
        assert_eq!(age_in_months(birth, date(2024, 5, 19)), 11);
        assert_eq!(age_in_months(birth, date(2024, 5, 20)), 12);
        assert_eq!(age_in_months(birth, date(2023, 6, 19)), 0);
        assert_eq!(age_in_months(birth, date(2023, 1, 1)), 0);
    }

    #[test]
    fn stage_boundaries_are_inclusive() {
        use DevelopmentalStage::*;
        assert_eq!(DevelopmentalStage::classify(0, 6), Infant);
        assert_eq!(DevelopmentalStage::classify(0, 7), Baby);
        assert_eq!(DevelopmentalStage::classify(1, 12), Baby);
        assert_eq!(DevelopmentalStage::classify(1, 13), Toddler);
        assert_eq!(DevelopmentalStage::classify(2, 24), Toddler);
        assert_eq!(DevelopmentalStage::classify(2, 25), Preschool);
        assert_eq!(DevelopmentalStage::classify(5, 71), Preschool);
        assert_eq!(DevelopmentalStage::classify(6, 72), SchoolAge);
        assert_eq!(DevelopmentalStage::classify(12, 155), SchoolAge);
        assert_eq!(DevelopmentalStage::classify(13, 156), Adolescent);
        assert_eq!(SchoolAge.label(), "escolar");
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_profile(
                "u1",
                ParentProfile {
                    id: "u1".into(),
                    name: Some("María".into()),
                    birthdate: Some("1990-02-01".into()),
                    feeding: None,
                },
            )
            .await;
        store
            .insert_baby(ChildProfile {
                id: "b1".into(),
                user_id: "u1".into(),
                name: "Ana".into(),
                birthdate: date(2024, 1, 15),
                feeding_mode: Some("lactancia materna".into()),
                weight_kg: Some(9.5),
                height_cm: None,
            })
            .await;
        store
            .insert_baby(ChildProfile {
                id: "b2".into(),
                user_id: "u1".into(),
                name: "Leo".into(),
                birthdate: date(2020, 3, 1),
                feeding_mode: None,
                weight_kg: None,
                height_cm: None,
            })
            .await;
        store
    }

    #[tokio::test]
    async fn renders_profiles_babies_and_na_markers() {
        let store = seeded_store().await;
        let builder = ProfileContextBuilder::new(Stores::from_backend(store));

        let ctx = builder.build("u1", date(2024, 10, 20)).await.unwrap();
        assert!(ctx.user_context.starts_with(
            "Perfiles:\n- Perfil: María, fecha de nacimiento 1990-02-01, alimentación: N/A"
        ));
        assert!(ctx.user_context.contains(
            "- Bebé: Ana, fecha de nacimiento 2024-01-15, edad: 0 años (9 meses aprox.), \
             etapa de desarrollo: bebé, alimentación: lactancia materna, peso: 9.5 kg, altura: N/A cm"
        ));
        assert!(ctx.user_context.contains("edad: 4 años (55 meses aprox.), etapa de desarrollo: preescolar"));
        assert_eq!(ctx.babies.len(), 2);
        assert_eq!(
            ctx.routines,
            "Ana: sin rutinas registradas\nLeo: sin rutinas registradas"
        );
    }

    #[tokio::test]
    async fn renders_knowledge_and_routines_per_child() {
        let store = seeded_store().await;
        store
            .save_knowledge(
                "u1",
                "b1",
                KnowledgeRecord {
                    category: "salud".into(),
                    subcategory: Some("alergias".into()),
                    title: "Alergia al huevo".into(),
                    description: "Ronchas al comer huevo".into(),
                    importance_level: 3,
                },
            )
            .await
            .unwrap();
        store
            .save_routine(
                "u1",
                "b1",
                &RoutineProposal {
                    baby_name: "Ana".into(),
                    routine_name: "Noche".into(),
                    context_summary: "Antes de dormir".into(),
                    activities: vec![
                        RoutineActivity {
                            time: "19:00".into(),
                            activity: "baño".into(),
                            duration_minutes: Some(10),
                        },
                        RoutineActivity {
                            time: "19:15".into(),
                            activity: "cuento".into(),
                            duration_minutes: None,
                        },
                    ],
                },
            )
            .await
            .unwrap();

        let builder = ProfileContextBuilder::new(Stores::from_backend(store));
        let ctx = builder.build("u1", date(2024, 10, 20)).await.unwrap();

        assert!(ctx.user_context.ends_with(
            "Conocimiento específico:\nAna:\n- [salud / alergias] Alergia al huevo: Ronchas al comer huevo (importancia: 3)"
        ));
        assert_eq!(
            ctx.routines,
            "Ana:\n- Noche (Antes de dormir)\n  - 19:00 baño (10 min)\n  - 19:15 cuento\nLeo: sin rutinas registradas"
        );
    }

    #[tokio::test]
    async fn unknown_user_renders_empty_blocks() {
        let store = seeded_store().await;
        let builder = ProfileContextBuilder::new(Stores::from_backend(store));
        let ctx = builder.build("nobody", date(2024, 10, 20)).await.unwrap();
        assert_eq!(ctx.user_context, "");
        assert_eq!(ctx.routines, "");
        assert!(ctx.babies.is_empty());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let stores = crate::test_helpers::failing_stores();
        let builder = ProfileContextBuilder::new(stores);
        assert!(builder.build("u1", date(2024, 10, 20)).await.is_err());
    }
}
