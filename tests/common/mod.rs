#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::get,
};
use findcrate::{
    EntitySchema, FindError, FindQueryBuilder, FindResult, JoinSpec, QueryParams, Relation, Schema,
    Through,
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, DbErr};
use sea_orm_migration::prelude::*;

pub mod animal_entity;
pub mod movie_entity;
pub mod person_entity;
pub mod person_movie_entity;

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let db = Database::connect("sqlite::memory:").await?;

    // Run migrations
    Migrator::up(&db, None).await?;
    seed(&db).await?;

    Ok(db)
}

/// Persons with parents, children, pets and movies:
///
/// | id | name            | age | parent |
/// |----|-----------------|-----|--------|
/// | 1  | Homer Simpson   | 39  | 6      |
/// | 2  | Marge Simpson   | 36  |        |
/// | 3  | Bart Simpson    | 10  | 1      |
/// | 4  | Lisa Simpson    | 8   | 1      |
/// | 5  | Maggie Simpson  | 1   | 2      |
/// | 6  | Abe Simpson     | 83  |        |
/// | 7  | Ned Flanders    | 60  |        |
/// | 8  | Rod Flanders    | 9   | 7      |
/// | 9  | Todd Flanders   | 7   | 7      |
/// | 10 | Moe Szyslak     | 45  |        |
pub async fn seed(db: &DatabaseConnection) -> Result<(), DbErr> {
    let persons = [
        (1, "Homer", "Simpson", 39, Some(6)),
        (2, "Marge", "Simpson", 36, None),
        (3, "Bart", "Simpson", 10, Some(1)),
        (4, "Lisa", "Simpson", 8, Some(1)),
        (5, "Maggie", "Simpson", 1, Some(2)),
        (6, "Abe", "Simpson", 83, None),
        (7, "Ned", "Flanders", 60, None),
        (8, "Rod", "Flanders", 9, Some(7)),
        (9, "Todd", "Flanders", 7, Some(7)),
        (10, "Moe", "Szyslak", 45, None),
    ];
    for (id, first_name, last_name, age, parent_id) in persons {
        person_entity::ActiveModel {
            id: Set(id),
            first_name: Set(first_name.to_string()),
            last_name: Set(last_name.to_string()),
            age: Set(age),
            parent_id: Set(parent_id),
        }
        .insert(db)
        .await?;
    }

    let animals = [
        (1, "Santa's Little Helper", "dog", Some(1)),
        (2, "Snowball II", "cat", Some(4)),
        (3, "Plopper", "pig", Some(1)),
        (4, "Stray", "cat", None),
    ];
    for (id, name, species, owner_id) in animals {
        animal_entity::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            species: Set(species.to_string()),
            owner_id: Set(owner_id),
        }
        .insert(db)
        .await?;
    }

    for (id, name) in [(1, "Itchy & Scratchy: The Movie"), (2, "Radioactive Man")] {
        movie_entity::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
        }
        .insert(db)
        .await?;
    }

    for (person_id, movie_id) in [(3, 1), (4, 1), (3, 2), (8, 2)] {
        person_movie_entity::ActiveModel {
            person_id: Set(person_id),
            movie_id: Set(movie_id),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

pub fn schema() -> Schema {
    Schema::new()
        .entity(
            EntitySchema::from_entity::<person_entity::Entity>()
                .relation(Relation::one_to_one("parent", "persons", "parent_id", "id"))
                .relation(Relation::to_many("children", "persons", "id", "parent_id"))
                .relation(Relation::to_many("pets", "animals", "id", "owner_id"))
                .relation(Relation::many_to_many(
                    "movies",
                    "movies",
                    JoinSpec {
                        owner_column: "id".to_string(),
                        related_column: "id".to_string(),
                    },
                    Through {
                        table: "persons_movies".to_string(),
                        owner_key: "person_id".to_string(),
                        related_key: "movie_id".to_string(),
                    },
                )),
        )
        .entity(
            EntitySchema::from_entity::<animal_entity::Entity>()
                .relation(Relation::one_to_one("owner", "persons", "owner_id", "id")),
        )
        .entity(EntitySchema::from_entity::<movie_entity::Entity>())
}

pub fn persons() -> FindQueryBuilder {
    FindQueryBuilder::new(schema(), "persons").unwrap()
}

/// Build and run `query` against the persons table.
pub async fn find(
    db: &DatabaseConnection,
    builder: &FindQueryBuilder,
    query: &str,
) -> Result<FindResult, FindError> {
    builder
        .build(&QueryParams::from_query_string(query))?
        .execute(db)
        .await
}

pub fn ids(result: &FindResult) -> Vec<i64> {
    result
        .results
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect()
}

pub fn first_names(result: &FindResult) -> Vec<&str> {
    result
        .results
        .iter()
        .map(|row| row["first_name"].as_str().unwrap())
        .collect()
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub persons: Arc<FindQueryBuilder>,
}

async fn list_persons(
    State(state): State<AppState>,
    params: QueryParams,
) -> Result<(HeaderMap, Json<FindResult>), FindError> {
    let query = state.persons.build(&params)?;
    let result = query.execute(&state.db).await?;
    let headers = query.content_range(&result, "persons").unwrap_or_default();
    Ok((headers, Json(result)))
}

pub fn setup_test_app(db: DatabaseConnection, persons: FindQueryBuilder) -> Router {
    let api = Router::new()
        .route("/persons", get(list_persons))
        .with_state(AppState {
            db,
            persons: Arc::new(persons),
        });

    Router::new().nest("/api/v1", api)
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateTables)]
    }
}

pub struct CreateTables;

#[async_trait::async_trait]
impl MigrationName for CreateTables {
    fn name(&self) -> &'static str {
        "m20240101_000001_create_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateTables {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = sea_orm::Schema::new(manager.get_database_backend());
        manager
            .create_table(schema.create_table_from_entity(person_entity::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(animal_entity::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(movie_entity::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(person_movie_entity::Entity))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in ["persons_movies", "movies", "animals", "persons"] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).to_owned())
                .await?;
        }
        Ok(())
    }
}
