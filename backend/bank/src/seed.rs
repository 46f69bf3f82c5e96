//! # Seed Catalog
//!
//! Survey topics bundled with the crate and pushed into the store by the
//! `process` binary.
//!
//! Payout seeds are drawn once per run (50 to 100) for every correct option.
//! `Hotel Industry` appears twice and the second entry overwrites the first.
use rand::Rng;

use crate::surveys::Survey;

const CATALOG: &str = include_str!("../surveys.json");

pub fn seed_catalog<R: Rng + ?Sized>(rng: &mut R) -> Result<Vec<Survey>, serde_json::Error> {
    let mut surveys: Vec<Survey> = serde_json::from_str(CATALOG)?;

    for option in surveys
        .iter_mut()
        .flat_map(|survey| survey.questions.iter_mut())
        .flat_map(|question| question.options.iter_mut())
        .filter(|option| option.is_correct)
    {
        option.payout = Some(rng.gen_range(50..=100));
    }

    Ok(surveys)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::thread_rng;

    use super::*;

    #[test]
    fn test_catalog_contents() {
        let surveys = seed_catalog(&mut thread_rng()).unwrap();
        assert_eq!(surveys.len(), 28);

        let topics: HashSet<_> = surveys.iter().map(|survey| survey.topic.as_str()).collect();
        assert_eq!(topics.len(), 27);
        assert_eq!(
            surveys
                .iter()
                .filter(|survey| survey.topic == "Hotel Industry")
                .count(),
            2
        );
    }

    #[test]
    fn test_every_survey_is_runnable() {
        for survey in seed_catalog(&mut thread_rng()).unwrap() {
            assert!(survey.check_runnable().is_ok(), "{}", survey.topic);
            assert!(survey.check_new().is_ok(), "{}", survey.topic);
        }
    }

    #[test]
    fn test_payouts_only_on_correct_options() {
        for survey in seed_catalog(&mut thread_rng()).unwrap() {
            for option in survey.questions.iter().flat_map(|q| q.options.iter()) {
                match option.payout {
                    Some(payout) => {
                        assert!(option.is_correct);
                        assert!((50..=100).contains(&payout));
                    }
                    None => assert!(!option.is_correct),
                }
            }
        }
    }
}
