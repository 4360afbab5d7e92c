//! Differential merge of a locally buffered snapshot into the canonical
//! document.
//!
//! Rules:
//! - settings: per-key shallow overwrite, keys missing locally are kept;
//! - identified lists (entries, colors, materials, customers): upsert by `id`,
//!   main order first, new local items appended in local order;
//! - category lists: replaced wholesale when the local field is present,
//!   including present-and-empty, kept when absent.
//!
//! Two writers changing the same item between syncs resolve as last writer
//! wins; there is no per-item clock.

use crate::core::{CanonicalDocument, PartialDocument, Record, record_id};
use std::collections::HashMap;

pub fn merge(mut main: CanonicalDocument, local: PartialDocument) -> CanonicalDocument {
    if let Some(settings) = local.settings {
        for (key, value) in settings {
            main.settings.insert(key, value);
        }
    }

    if let Some(entries) = local.entries {
        main.entries = upsert_by_id(main.entries, entries);
    }
    if let Some(colors) = local.colors {
        main.colors = upsert_by_id(main.colors, colors);
    }
    if let Some(materials) = local.materials {
        main.materials = upsert_by_id(main.materials, materials);
    }
    if let Some(customers) = local.customers {
        main.customers = upsert_by_id(main.customers, customers);
    }

    if let Some(categories) = local.material_categories {
        main.material_categories = categories;
    }
    if let Some(categories) = local.color_categories {
        main.color_categories = categories;
    }

    for (key, value) in local.extra {
        main.extra.insert(key, value);
    }
    main
}

/// Top-level shallow overwrite used by direct saves: every field present in
/// `partial` replaces the field in `main` wholesale.
pub fn overlay(mut main: CanonicalDocument, partial: PartialDocument) -> CanonicalDocument {
    if let Some(settings) = partial.settings {
        main.settings = settings;
    }
    if let Some(entries) = partial.entries {
        main.entries = entries;
    }
    if let Some(colors) = partial.colors {
        main.colors = colors;
    }
    if let Some(materials) = partial.materials {
        main.materials = materials;
    }
    if let Some(customers) = partial.customers {
        main.customers = customers;
    }
    if let Some(categories) = partial.material_categories {
        main.material_categories = categories;
    }
    if let Some(categories) = partial.color_categories {
        main.color_categories = categories;
    }
    for (key, value) in partial.extra {
        main.extra.insert(key, value);
    }
    main
}

fn id_key(record: &Record) -> Option<String> {
    record_id(record).map(|id| id.to_string())
}

fn upsert_by_id(mut main: Vec<Record>, local: Vec<Record>) -> Vec<Record> {
    let mut positions: HashMap<String, usize> = main
        .iter()
        .enumerate()
        .filter_map(|(index, record)| id_key(record).map(|key| (key, index)))
        .collect();

    for record in local {
        match id_key(&record) {
            Some(key) => match positions.get(&key) {
                Some(&index) => main[index] = record,
                None => {
                    positions.insert(key, main.len());
                    main.push(record);
                }
            },
            None => main.push(record),
        }
    }
    main
}
