use dockstage_model::{DEFAULT_TAG, ImageRef, RegistryAddress};
use rand::seq::SliceRandom;
use uuid::Uuid;

/// Picks a cache destination: a uniformly random registry from `pool` and a fresh
/// 32-hex-digit repository name. Uniqueness is probabilistic; nothing checks the
/// registry for an existing image with the same name.
///
/// Returns `None` for an empty pool.
pub fn generate_destination(pool: &[RegistryAddress]) -> Option<ImageRef> {
    let registry = pool.choose(&mut rand::thread_rng())?;
    let repository = Uuid::new_v4().simple().to_string();
    Some(ImageRef::new(registry.as_str(), repository, DEFAULT_TAG))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_address_is_used_and_names_do_not_repeat() {
        let pool =
            RegistryAddress::parse_list("10.0.0.1:5000,10.0.0.2:5000,10.0.0.3:5000,10.0.0.4:5000")
                .unwrap();

        let mut registries = HashSet::new();
        let mut names = HashSet::new();
        for _ in 0..1000 {
            let dest = generate_destination(&pool).unwrap();
            registries.insert(dest.registry.clone());
            assert!(names.insert(dest.to_string()), "repeated destination {dest}");
        }
        assert_eq!(registries.len(), pool.len());
    }

    #[test]
    fn repository_is_a_valid_reference() {
        let pool = RegistryAddress::parse_list("localhost:5000").unwrap();
        let dest = generate_destination(&pool).unwrap();
        assert_eq!(dest.repository.len(), 32);

        let reparsed = ImageRef::parse_ref(&dest.to_string()).unwrap();
        assert_eq!(reparsed, dest);
    }

    #[test]
    fn empty_pool_yields_nothing() {
        assert!(generate_destination(&[]).is_none());
    }
}
