//! Random display names, team names and join codes.

use rand::{
    Rng,
    seq::{IndexedRandom, SliceRandom},
};

use crate::config::AppConfig;

/// Lowest join code.
pub const JOIN_CODE_MIN: u32 = 100_000;
/// Highest join code.
pub const JOIN_CODE_MAX: u32 = 999_999;

/// Six-digit join code.
pub fn generate_join_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.random_range(JOIN_CODE_MIN..=JOIN_CODE_MAX).to_string()
}

/// "Adjective Noun" display name drawn from the configured word lists.
pub fn random_display_name<R: Rng + ?Sized>(config: &AppConfig, rng: &mut R) -> String {
    let adjective = config
        .adjectives()
        .choose(rng)
        .map(String::as_str)
        .unwrap_or("Mystery");
    let noun = config
        .nouns()
        .choose(rng)
        .map(String::as_str)
        .unwrap_or("Player");
    format!("{adjective} {noun}")
}

/// Display name for a joining player.
///
/// The requested name is used unless the host forces random names or it is blank.
pub fn resolve_display_name<R: Rng + ?Sized>(
    requested: Option<&str>,
    force_random: bool,
    config: &AppConfig,
    rng: &mut R,
) -> String {
    match requested.map(str::trim) {
        Some(name) if !force_random && !name.is_empty() => name.to_string(),
        _ => random_display_name(config, rng),
    }
}

/// `count` distinct team names drawn without replacement from the configured pool.
///
/// Once the pool runs out, names are numbered.
pub fn pick_team_names<R: Rng + ?Sized>(
    config: &AppConfig,
    count: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut pool = config.team_names().to_vec();
    pool.shuffle(rng);
    let mut names: Vec<String> = pool.into_iter().take(count).collect();
    let drawn = names.len();
    names.extend((drawn..count).map(|index| format!("Team {}", index + 1)));
    names
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn join_codes_have_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_join_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn blank_or_forced_names_are_randomised() {
        let config = AppConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(
            resolve_display_name(Some("  Ada "), false, &config, &mut rng),
            "Ada"
        );

        let forced = resolve_display_name(Some("Ada"), true, &config, &mut rng);
        assert_ne!(forced, "Ada");
        assert_eq!(forced.split(' ').count(), 2);

        let blank = resolve_display_name(Some("   "), false, &config, &mut rng);
        assert!(!blank.trim().is_empty());
    }

    #[test]
    fn team_names_are_distinct_and_padded() {
        let config = AppConfig::default();
        let mut rng = StdRng::seed_from_u64(3);

        let names = pick_team_names(&config, 4, &mut rng);
        assert_eq!(names.len(), 4);
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), 4);

        let many = config.team_names().len() + 2;
        let names = pick_team_names(&config, many, &mut rng);
        assert_eq!(names.len(), many);
        assert_eq!(names.last().unwrap(), &format!("Team {many}"));
    }
}
