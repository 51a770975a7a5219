//! End-to-end tagging through the public API.

use nofly::{
    Declarations, Filter, Owner, Query, Registry, Store, Taggable, Tagged, TaggingConfig,
    TypeFilter,
};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DECLARATIONS: &str = r#"{
    "types": [
        {
            "name": "Car",
            "table": "cars",
            "contexts": {
                "colors": null,
                "fuel_types": { "case_sensitive": false, "counter_cache": true },
                "labels": { "polymorphic": true }
            }
        },
        {
            "name": "Truck",
            "table": "trucks",
            "contexts": { "labels": { "polymorphic": true } }
        }
    ]
}"#;

const HOST_DDL: &str = "
CREATE TABLE IF NOT EXISTS cars (id INTEGER PRIMARY KEY, make TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS trucks (id INTEGER PRIMARY KEY, make TEXT NOT NULL);
";

#[derive(Debug, Clone)]
struct Car {
    id: Option<i64>,
    make: String,
}

impl Taggable for Car {
    const TYPE_NAME: &'static str = "Car";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn insert(&self, conn: &Connection) -> nofly::Result<i64> {
        conn.execute("INSERT INTO cars (make) VALUES (?1)", [&self.make])?;
        Ok(conn.last_insert_rowid())
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone)]
struct Truck {
    id: Option<i64>,
}

impl Taggable for Truck {
    const TYPE_NAME: &'static str = "Truck";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn insert(&self, conn: &Connection) -> nofly::Result<i64> {
        conn.execute("INSERT INTO trucks (make) VALUES ('Scania')", [])?;
        Ok(conn.last_insert_rowid())
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registry() -> Arc<Registry> {
    let mut registry = Registry::new(TaggingConfig::default());
    let decls: Declarations = DECLARATIONS.parse().unwrap();
    decls.apply(&mut registry).unwrap();
    Arc::new(registry)
}

fn prepare(store: &Store) {
    store.conn().execute_batch(HOST_DDL).unwrap();
    store.install_all().unwrap();
}

fn open_memory() -> Store {
    init_tracing();
    let store = Store::open_memory(registry()).unwrap();
    prepare(&store);
    store
}

fn open_file(path: &Path) -> Store {
    init_tracing();
    let store = Store::open(path, registry()).unwrap();
    prepare(&store);
    store
}

fn car(store: &mut Store, make: &str, colors: &str) -> i64 {
    let mut car = Tagged::new(Car {
        id: None,
        make: make.to_string(),
    });
    car.set(store, "colors", colors).unwrap();
    assert!(car.save(store));
    car.record().id.unwrap()
}

/// Cars 1..=4 tagged {red, blue}, {red}, {blue, green}, {}.
fn showroom(store: &mut Store) -> [i64; 4] {
    [
        car(store, "Toyota", "red, blue"),
        car(store, "Volvo", "red"),
        car(store, "Fiat", "blue, green"),
        car(store, "Saab", ""),
    ]
}

fn ids(store: &Store, query: &Query<'_>) -> Vec<i64> {
    store.ids(query).unwrap()
}

#[test]
fn test_any_all_exact_and_none() {
    let mut store = open_memory();
    let [toyota, volvo, fiat, saab] = showroom(&mut store);
    let registry = Arc::clone(store.registry());
    let cars = || Query::of::<Car>(&registry).unwrap();

    let red = cars().with_any("colors", ["red"]).unwrap();
    assert_eq!(ids(&store, &red), vec![toyota, volvo]);

    let red_or_green = cars().with_any("colors", "red, green".split(", ")).unwrap();
    assert_eq!(ids(&store, &red_or_green), vec![toyota, volvo, fiat]);

    let red_and_blue = cars().with_all("colors", ["red", "blue"]).unwrap();
    assert_eq!(ids(&store, &red_and_blue), vec![toyota]);

    let only_red = cars().with_exact("colors", ["red"]).unwrap();
    assert_eq!(ids(&store, &only_red), vec![volvo]);
    let blue_red = cars().with_exact("colors", ["blue", "red"]).unwrap();
    assert_eq!(ids(&store, &blue_red), vec![toyota]);

    let untagged = cars().without("colors").unwrap();
    assert_eq!(ids(&store, &untagged), vec![saab]);
    let not_red = cars().without_any("colors", ["red"]).unwrap();
    assert_eq!(ids(&store, &not_red), vec![fiat, saab]);

    let volvo_red = cars()
        .with_any("colors", ["red"])
        .unwrap()
        .filter(Filter::equals("make", "Volvo".to_string()))
        .unwrap();
    assert_eq!(ids(&store, &volvo_red), vec![volvo]);
    assert_eq!(store.count(&red).unwrap(), 2);
}

#[test]
fn test_all_is_subset_of_any() {
    let mut store = open_memory();
    showroom(&mut store);
    let registry = Arc::clone(store.registry());

    for names in [vec!["red"], vec!["red", "blue"], vec!["blue", "green"], vec!["green", "red"]] {
        let any = Query::of::<Car>(&registry)
            .unwrap()
            .with_any("colors", names.clone())
            .unwrap();
        let all = Query::of::<Car>(&registry)
            .unwrap()
            .with_all("colors", names.clone())
            .unwrap();
        let any_ids = ids(&store, &any);
        for id in ids(&store, &all) {
            assert!(any_ids.contains(&id), "{id} matched all of {names:?} but not any");
        }
    }
}

#[test]
fn test_empty_name_lists() {
    let mut store = open_memory();
    let all_cars = showroom(&mut store).to_vec();
    let registry = Arc::clone(store.registry());
    let cars = || Query::of::<Car>(&registry).unwrap();
    let none: Vec<&str> = Vec::new();

    assert!(ids(&store, &cars().with_any("colors", none.clone()).unwrap()).is_empty());
    assert!(ids(&store, &cars().with_all("colors", none.clone()).unwrap()).is_empty());
    assert_eq!(
        ids(&store, &cars().with_exact("colors", none.clone()).unwrap()),
        ids(&store, &cars().without("colors").unwrap())
    );
    assert_eq!(ids(&store, &cars().without_any("colors", none).unwrap()), all_cars);
}

#[test]
fn test_case_policy_per_context() {
    let mut store = open_memory();
    let mut volvo = Tagged::new(Car {
        id: None,
        make: "Volvo".into(),
    });
    volvo.set(&mut store, "colors", "Red").unwrap();
    volvo.set(&mut store, "fuel_types", "Diesel").unwrap();
    assert!(volvo.save(&mut store));
    let id = volvo.record().id.unwrap();
    let registry = Arc::clone(store.registry());
    let cars = || Query::of::<Car>(&registry).unwrap();

    assert!(ids(&store, &cars().with_any("colors", ["red"]).unwrap()).is_empty());
    assert_eq!(ids(&store, &cars().with_any("fuel_types", ["DIESEL"]).unwrap()), vec![id]);
    assert_eq!(ids(&store, &cars().with_exact("fuel_types", ["diesel"]).unwrap()), vec![id]);

    // Folding is query-time only; storage keeps each spelling.
    let mut other = Tagged::new(Car {
        id: None,
        make: "Saab".into(),
    });
    other.set(&mut store, "fuel_types", "diesel").unwrap();
    assert!(other.save(&mut store));
    let other_id = other.record().id.unwrap();
    let plan = store.plan("Car", "fuel_types").unwrap();
    assert_eq!(store.tags(&plan).unwrap().len(), 2);
    assert_eq!(store.tag_names(&plan, other_id).unwrap(), vec!["diesel"]);
    assert_eq!(
        ids(&store, &cars().with_all("fuel_types", ["Diesel"]).unwrap()),
        vec![id, other_id]
    );
}

#[test]
fn test_shared_context_isolates_types() {
    let mut store = open_memory();
    let mut car = Tagged::new(Car {
        id: None,
        make: "Toyota".into(),
    });
    car.add(&mut store, "labels", "fragile, export").unwrap();
    assert!(car.save(&mut store));
    let mut truck = Tagged::new(Truck { id: None });
    truck.add(&mut store, "labels", "fragile").unwrap();
    assert!(truck.save(&mut store));
    let car_id = car.record().id.unwrap();
    let truck_id = truck.record().id.unwrap();

    // The global vocabulary holds one row per name.
    let plan = store.plan("Car", "labels").unwrap();
    assert_eq!(store.tags(&plan).unwrap().len(), 2);

    let registry = Arc::clone(store.registry());
    let fragile_cars = Query::of::<Car>(&registry)
        .unwrap()
        .with_any("labels", ["fragile"])
        .unwrap();
    assert_eq!(ids(&store, &fragile_cars), vec![car_id]);
    let fragile_trucks = Query::of::<Truck>(&registry)
        .unwrap()
        .with_exact("labels", ["fragile"])
        .unwrap();
    assert_eq!(ids(&store, &fragile_trucks), vec![truck_id]);

    let own = store.taggables(&plan, "fragile", &TypeFilter::Own).unwrap();
    assert_eq!(own, vec![Owner::Typed { owner_type: "Car".into(), id: car_id }]);
    let any = store.taggables(&plan, "fragile", &TypeFilter::Any).unwrap();
    assert_eq!(any.len(), 2);
    let trucks = store
        .taggables(&plan, "fragile", &TypeFilter::Only("Truck".into()))
        .unwrap();
    assert_eq!(trucks, vec![Owner::Typed { owner_type: "Truck".into(), id: truck_id }]);
}

#[test]
fn test_counter_cache_matches_taggings() {
    let mut store = open_memory();
    let mut made = Vec::new();
    for (make, fuels) in [("Volvo", "diesel, lpg"), ("Fiat", "petrol"), ("Saab", "")] {
        let mut car = Tagged::new(Car {
            id: None,
            make: make.into(),
        });
        car.set(&mut store, "fuel_types", fuels).unwrap();
        assert!(car.save(&mut store));
        made.push(car);
    }
    made[0].remove(&mut store, "fuel_types", "lpg").unwrap();
    made[0].add(&mut store, "fuel_types", "electric, hydrogen").unwrap();
    assert!(made[0].save(&mut store));
    made[1].clear(&mut store, "fuel_types").unwrap();
    assert!(made[1].save(&mut store));

    let plan = store.plan("Car", "fuel_types").unwrap();
    let registry = Arc::clone(store.registry());
    let counts = store
        .tag_counts(&Query::of::<Car>(&registry).unwrap(), "fuel_types")
        .unwrap();
    assert_eq!(counts.len(), 3);
    for (id, count) in counts {
        assert_eq!(store.counter(&plan, id).unwrap(), Some(count));
        assert_eq!(store.tagging_count(&plan, id).unwrap(), count);
    }
    assert_eq!(store.counter(&plan, made[0].record().id.unwrap()).unwrap(), Some(3));
}

#[test]
fn test_reopened_store_sees_saved_tags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");
    let id = {
        let mut store = open_file(&path);
        car(&mut store, "Toyota", "red, blue")
    };

    let mut store = open_file(&path);
    let plan = store.plan("Car", "colors").unwrap();
    assert_eq!(store.tag_names(&plan, id).unwrap(), vec!["red", "blue"]);

    let mut reloaded = Tagged::new(Car {
        id: Some(id),
        make: "Toyota".into(),
    });
    let mut colors = reloaded.list(&mut store, "colors").unwrap();
    assert!(colors.contains("blue").unwrap());
    assert!(colors.remove_now("blue").unwrap());
    assert_eq!(store.tag_names(&plan, id).unwrap(), vec!["red"]);
}

#[test]
fn test_two_connections_share_one_tag_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");
    let mut first = open_file(&path);
    let mut second = open_file(&path);

    let a = car(&mut first, "Toyota", "red");
    let b = car(&mut second, "Volvo", "red, blue");

    let plan = first.plan("Car", "colors").unwrap();
    let names: Vec<String> = first
        .tags(&plan)
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["red", "blue"]);
    assert_eq!(first.tag_names(&plan, b).unwrap(), vec!["red", "blue"]);
    assert_eq!(second.tag_names(&plan, a).unwrap(), vec!["red"]);
}

#[test]
fn test_schema_check_after_install() {
    let store = open_memory();
    for plan in store.registry().plans() {
        let report = store.check(plan).unwrap();
        assert!(report.is_ok(), "{}.{} wiring incomplete", plan.taggable.name, plan.context);
    }
}
