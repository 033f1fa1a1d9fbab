//! The bundled `people` entity type, its seed data and typed queries

use std::sync::Arc;
use tracing::info;

use super::document::{Document, FieldValue};
use super::error::Result;
use super::geo::{Distance, GeoPoint};
use super::maintainer::Upserted;
use super::query::{Predicate, PredicateTree};
use super::repository::Repository;
use super::schema::{EntityType, FieldSpec, IndexKind, ValueKind};

pub const ENTITY: &str = "people";

pub fn entity_type() -> EntityType {
    EntityType::new(
        ENTITY,
        vec![
            FieldSpec::id("id").indexed(IndexKind::Exact),
            FieldSpec::new("firstName", ValueKind::String)
                .indexed(IndexKind::Exact)
                .required(),
            FieldSpec::new("lastName", ValueKind::String)
                .indexed(IndexKind::Exact)
                .required(),
            FieldSpec::new("age", ValueKind::Integer)
                .indexed(IndexKind::Range)
                .required(),
            FieldSpec::new("personalStatement", ValueKind::String)
                .indexed(IndexKind::FullText)
                .required(),
            FieldSpec::new("homeLoc", ValueKind::GeoPoint)
                .indexed(IndexKind::Geo)
                .required(),
            FieldSpec::object(
                "address",
                vec![
                    FieldSpec::new("houseNumber", ValueKind::String),
                    FieldSpec::new("street", ValueKind::String),
                    FieldSpec::new("city", ValueKind::String).indexed(IndexKind::Exact),
                    FieldSpec::new("state", ValueKind::String).indexed(IndexKind::Exact),
                    FieldSpec::new("postalCode", ValueKind::String),
                    FieldSpec::new("country", ValueKind::String),
                ],
            )
            .required(),
            FieldSpec::new("skills", ValueKind::StringSet)
                .indexed(IndexKind::SetMembership)
                .required(),
        ],
    )
}

pub struct Address<'a> {
    pub house_number: &'a str,
    pub street: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub postal_code: &'a str,
    pub country: &'a str,
}

impl Address<'_> {
    fn to_value(&self) -> FieldValue {
        FieldValue::object([
            ("houseNumber", FieldValue::from(self.house_number)),
            ("street", FieldValue::from(self.street)),
            ("city", FieldValue::from(self.city)),
            ("state", FieldValue::from(self.state)),
            ("postalCode", FieldValue::from(self.postal_code)),
            ("country", FieldValue::from(self.country)),
        ])
    }
}

/// Build a person document without an id
pub fn person(
    first: &str,
    last: &str,
    age: i64,
    statement: &str,
    home: GeoPoint,
    address: Address<'_>,
    skills: &[&str],
) -> Document {
    Document::new()
        .with("firstName", first)
        .with("lastName", last)
        .with("age", age)
        .with("personalStatement", statement)
        .with("homeLoc", home)
        .with("address", address.to_value())
        .with("skills", FieldValue::set(skills.iter().copied()))
}

/// The six demo people
pub fn seed_documents() -> Vec<Document> {
    vec![
        person(
            "Chris",
            "Hemsworth",
            38,
            "The Rabbit Is Correct, And Clearly The Smartest One Among You.",
            GeoPoint::new(153.616667, -28.716667),
            Address {
                house_number: "248",
                street: "Seven Mile Beach Rd",
                city: "Broken Head",
                state: "NSW",
                postal_code: "2481",
                country: "Australia",
            },
            &["hammer", "biceps", "hair", "heart"],
        ),
        person(
            "Robert",
            "Downey",
            56,
            "Doth mother know you weareth her drapes?",
            GeoPoint::new(-72.5371874, 40.9190747),
            Address {
                house_number: "11",
                street: "Commerce Dr",
                city: "Riverhead",
                state: "NY",
                postal_code: "11901",
                country: "US",
            },
            &["tech", "money", "one-liners", "intelligence", "resources"],
        ),
        person(
            "Scarlett",
            "Johansson",
            37,
            "Hey, fellas. Either one of you know where the Smithsonian is? I\u{2019}m here to pick up a fossil.",
            GeoPoint::new(-74.0129994, 40.7215259),
            Address {
                house_number: "605",
                street: "48th St",
                city: "New York",
                state: "NY",
                postal_code: "10019",
                country: "US",
            },
            &["deception", "martial_arts"],
        ),
        person(
            "Elizabeth",
            "Olsen",
            32,
            "You Guys Know I Can Move Things With My Mind, Right?",
            GeoPoint::new(-74.2598641, 40.6976701),
            Address {
                house_number: "20",
                street: "W 34th St",
                city: "New York",
                state: "NY",
                postal_code: "10001",
                country: "US",
            },
            &["magic", "loyalty"],
        ),
        person(
            "Zoe",
            "Saldana",
            43,
            "I Am Going To Die Surrounded By The Biggest Idiots In The Galaxy.",
            GeoPoint::new(-118.399968, 34.073087),
            Address {
                house_number: "107",
                street: "S Beverly Glen Blvd",
                city: "Los Angeles",
                state: "CA",
                postal_code: "90024",
                country: "US",
            },
            &["skills", "martial_arts"],
        ),
        person(
            "Samuel L.",
            "Jackson",
            73,
            "Sir, I\u{2019}m Gonna Have To Ask You To Exit The Donut",
            GeoPoint::new(-118.4345534, 34.082615),
            Address {
                house_number: "11461",
                street: "Sunset Blvd",
                city: "Los Angeles",
                state: "CA",
                postal_code: "90049",
                country: "US",
            },
            &["planning", "deception", "resources"],
        ),
    ]
}

/// Register the people entity type unless it already is
pub fn ensure_registered(repo: &Repository) -> Result<Arc<EntityType>> {
    match repo.entity(ENTITY) {
        Ok(entity) => Ok(entity),
        Err(_) => repo.register_entity(entity_type()),
    }
}

/// Replace every person with the seed set
pub fn init_data(repo: &Repository) -> Result<Vec<Document>> {
    ensure_registered(repo)?;
    repo.delete_all(ENTITY)?;

    let mut saved = Vec::new();
    for doc in seed_documents() {
        saved.push(repo.upsert(ENTITY, doc)?.document);
    }
    info!(count = saved.len(), "seeded people");
    Ok(saved)
}

pub fn by_name(first: &str, last: &str) -> PredicateTree {
    PredicateTree::new()
        .and(Predicate::equals("firstName", first))
        .and(Predicate::equals("lastName", last))
}

pub fn age_between(min: i64, max: i64) -> PredicateTree {
    Predicate::range("age", min, max).into()
}

pub fn home_loc_near(point: GeoPoint, distance: Distance) -> PredicateTree {
    Predicate::geo_within("homeLoc", point, distance).into()
}

pub fn statement_search(text: &str) -> PredicateTree {
    Predicate::text_matches("personalStatement", text).into()
}

pub fn by_city(city: &str) -> PredicateTree {
    Predicate::equals("address.city", city).into()
}

pub fn any_skills<I, S>(skills: I) -> PredicateTree
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Predicate::set_intersects("skills", skills).into()
}

/// Set a person's age and save it
///
/// The report carries a warning when the age was stored but its index
/// entries still need repair.
pub fn update_age(repo: &Repository, id: &str, age: i64) -> Result<Upserted> {
    let mut person = repo.find_by_id(ENTITY, id)?;
    person.set("age", age);
    repo.upsert(ENTITY, person)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineError;

    fn first_names(docs: &[Document]) -> Vec<String> {
        let mut names: Vec<String> = docs
            .iter()
            .filter_map(|d| d.get("firstName").and_then(|v| v.as_str()).map(String::from))
            .collect();
        names.sort();
        names
    }

    fn seeded() -> Repository {
        let repo = Repository::in_memory();
        init_data(&repo).unwrap();
        repo
    }

    #[test]
    fn test_seed_is_valid_and_repeatable() {
        let repo = seeded();
        assert_eq!(repo.find_all(ENTITY).unwrap().len(), 6);
        init_data(&repo).unwrap();
        assert_eq!(repo.find_all(ENTITY).unwrap().len(), 6);
        assert!(repo.verify(ENTITY).is_ok());
    }

    #[test]
    fn test_typed_queries() {
        let repo = seeded();

        let found = repo.query(ENTITY, &by_name("Chris", "Hemsworth")).unwrap();
        assert_eq!(first_names(&found), vec!["Chris"]);

        let found = repo.query(ENTITY, &age_between(30, 40)).unwrap();
        assert_eq!(first_names(&found), vec!["Chris", "Elizabeth", "Scarlett"]);

        let found = repo.query(ENTITY, &by_city("New York")).unwrap();
        assert_eq!(first_names(&found), vec!["Elizabeth", "Scarlett"]);

        let found = repo.query(ENTITY, &any_skills(["deception"])).unwrap();
        assert_eq!(first_names(&found), vec!["Samuel L.", "Scarlett"]);

        let found = repo.query(ENTITY, &statement_search("rabbit")).unwrap();
        assert_eq!(first_names(&found), vec!["Chris"]);

        let found = repo
            .query(
                ENTITY,
                &home_loc_near(GeoPoint::new(-118.399968, 34.073087), Distance::miles(10.0)),
            )
            .unwrap();
        assert_eq!(first_names(&found), vec!["Samuel L.", "Zoe"]);
    }

    #[test]
    fn test_update_age() {
        let repo = seeded();
        let zoe = repo.query(ENTITY, &by_name("Zoe", "Saldana")).unwrap().remove(0);

        let updated = update_age(&repo, &zoe.id, 44).unwrap();
        assert!(updated.warning.is_none());
        assert!(!updated.created);
        assert_eq!(updated.document.get("age"), Some(&FieldValue::Integer(44)));
        assert!(repo.query(ENTITY, &age_between(43, 43)).unwrap().is_empty());
        assert_eq!(repo.query(ENTITY, &age_between(44, 44)).unwrap().len(), 1);

        assert!(matches!(
            update_age(&repo, "nobody", 1),
            Err(EngineError::NotFound { .. })
        ));
    }
}
