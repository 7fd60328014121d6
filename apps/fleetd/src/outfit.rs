//! Equipment planning: compute a target eight-slot outfit per role from
//! the pooled holdings of everyone in the zone.
//!
//! Two phases: first every role (天尊 school first, then 道术) is
//! guaranteed four pieces of the best set still available; then each
//! outfit is filled to eight by walking the class strategy's combos, with
//! a two-piece rescue and a loose per-slot fallback behind them.

use std::collections::{HashMap, HashSet};

use fleetproto::report::RoleAttributes;

use crate::catalog::{self, Strategy, SLOT_ORDER, XUANYUAN_HEART};
use crate::registry::ZoneSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Equipped,
    Bag,
    Warehouse,
}

/// One line of the zone-wide item pool.
#[derive(Debug, Clone)]
pub struct PoolItem {
    pub name: String,
    pub count: i64,
    pub owner: String,
    pub slot: String,
    pub place: Place,
}

/// Target loadout for one role. Slots hold item names; absent means empty.
/// Special items (轩辕之心) ride the side channel and never occupy a slot.
#[derive(Debug, Clone, Default)]
pub struct Outfit {
    pub by_slot: HashMap<&'static str, String>,
    pub special: HashMap<String, i64>,
}

impl Outfit {
    pub fn get(&self, slot: &str) -> &str {
        self.by_slot.get(slot).map(String::as_str).unwrap_or("")
    }

    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        SLOT_ORDER
            .iter()
            .filter_map(|s| self.by_slot.get(s))
            .map(String::as_str)
    }

    fn first_empty_slot(&self) -> Option<&'static str> {
        SLOT_ORDER.iter().copied().find(|s| self.get(s).is_empty())
    }

    fn missing_slots(&self) -> Vec<&'static str> {
        SLOT_ORDER
            .iter()
            .copied()
            .filter(|s| self.get(s).is_empty())
            .collect()
    }

    /// The pair slots may both be filled only with distinct names.
    pub fn pairs_valid(&self) -> bool {
        let ok = |a: &str, b: &str| {
            let (a, b) = (self.get(a), self.get(b));
            a.is_empty() || b.is_empty() || a != b
        };
        ok("手镯1", "手镯2") && ok("戒指1", "戒指2")
    }
}

/// Flatten every role's three collections into one multiset.
pub fn build_pool(roles: &[&RoleAttributes]) -> Vec<PoolItem> {
    let mut pool = Vec::new();
    for r in roles {
        for e in &r.equipments {
            pool.push(PoolItem {
                name: e.name.clone(),
                count: 1,
                owner: r.role_name.clone(),
                slot: e.slot.clone(),
                place: Place::Equipped,
            });
        }
        for it in &r.backpack {
            pool.push(PoolItem {
                name: it.name.clone(),
                count: it.count,
                owner: r.role_name.clone(),
                slot: String::new(),
                place: Place::Bag,
            });
        }
        for it in &r.warehouse {
            pool.push(PoolItem {
                name: it.name.clone(),
                count: it.count,
                owner: r.role_name.clone(),
                slot: String::new(),
                place: Place::Warehouse,
            });
        }
    }
    pool
}

fn take_exact(pool: &mut [PoolItem], name: &str) -> bool {
    for p in pool.iter_mut() {
        if p.name == name && p.count > 0 {
            p.count -= 1;
            return true;
        }
    }
    false
}

fn return_to_pool(pool: &mut Vec<PoolItem>, name: &str) {
    for p in pool.iter_mut() {
        if p.name == name {
            p.count += 1;
            return;
        }
    }
    pool.push(PoolItem {
        name: name.to_string(),
        count: 1,
        owner: String::new(),
        slot: String::new(),
        place: Place::Bag,
    });
}

/// Rough placement by name: guessed slot, pair slots in order, otherwise
/// the first empty slot in canonical order.
fn place_by_name(out: &mut Outfit, name: &str) {
    match catalog::guess_slot(name) {
        Some("手镯") => {
            if out.get("手镯1").is_empty() {
                out.by_slot.insert("手镯1", name.to_string());
                return;
            }
            if out.get("手镯2").is_empty() && out.get("手镯1") != name {
                out.by_slot.insert("手镯2", name.to_string());
                return;
            }
        }
        Some("戒指") => {
            if out.get("戒指1").is_empty() {
                out.by_slot.insert("戒指1", name.to_string());
                return;
            }
            if out.get("戒指2").is_empty() && out.get("戒指1") != name {
                out.by_slot.insert("戒指2", name.to_string());
                return;
            }
        }
        Some(slot) => {
            if out.get(slot).is_empty() {
                out.by_slot.insert(slot, name.to_string());
                return;
            }
        }
        None => {}
    }
    if let Some(slot) = out.first_empty_slot() {
        out.by_slot.insert(slot, name.to_string());
    }
}

/// Phase 1: withdraw four distinct pieces of the best-ranked set that
/// still has four available. The SETS table is rank-ordered, so the first
/// hit is the best.
fn take_best_four_piece(pool: &mut Vec<PoolItem>) -> Option<Vec<&'static str>> {
    let set = catalog::SETS.iter().find(|s| {
        s.pieces
            .iter()
            .filter(|piece| pool.iter().any(|p| p.name == **piece && p.count > 0))
            .count()
            >= 4
    })?;
    let mut taken = Vec::with_capacity(4);
    for &piece in set.pieces {
        if taken.len() >= 4 {
            break;
        }
        if take_exact(pool, piece) {
            taken.push(piece);
        }
    }
    Some(taken)
}

/// Sets already represented in the outfit, minus the Phase-1 set (which
/// is always allowed to contribute again).
fn used_sets(out: &Outfit, exclude: Option<&'static str>) -> HashSet<&'static str> {
    let mut used = HashSet::new();
    for name in out.by_slot.values() {
        if let Some(set) = catalog::set_of_item(name) {
            if Some(set) != exclude {
                used.insert(set);
            }
        }
    }
    used
}

/// Which set the role's four-piece came from, if the outfit holds one.
fn four_piece_set(out: &Outfit) -> Option<&'static str> {
    let mut count: HashMap<&'static str, usize> = HashMap::new();
    for name in out.by_slot.values() {
        if let Some(set) = catalog::set_of_item(name) {
            *count.entry(set).or_insert(0) += 1;
        }
    }
    count.into_iter().find(|(_, c)| *c >= 4).map(|(s, _)| s)
}

fn segment_sources(seg: &str, stg: &Strategy) -> Option<Vec<&'static str>> {
    match seg {
        "3主体" => Some(stg.pri3.to_vec()),
        "2主体" => Some(stg.pri2.to_vec()),
        "1主体" => Some(stg.pri1.to_vec()),
        "4其他主体" => Some(catalog::all_sets_except(stg.pri4)),
        "2其他主体" => Some(catalog::all_sets_except(stg.pri2)),
        "3天机" => Some(vec!["天机套"]),
        "3疾风" => Some(vec!["疾风套"]),
        "3天机/疾风" => Some(vec!["天机套", "疾风套"]),
        "2祝福" => Some(vec!["祝福套"]),
        _ => None,
    }
}

fn segment_count(seg: &str) -> usize {
    seg.chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0) as usize
}

/// Place one pair-slot item (手镯 or 戒指). Returns the slot used.
fn place_pair(
    out: &mut Outfit,
    kind: &str,
    item: &'static str,
    pool: &mut Vec<PoolItem>,
) -> Option<&'static str> {
    let (one, two): (&'static str, &'static str) = if kind == "手镯" {
        ("手镯1", "手镯2")
    } else {
        ("戒指1", "戒指2")
    };
    if !out.get(one).is_empty() && !out.get(two).is_empty() {
        return None;
    }
    if !take_exact(pool, item) {
        return None;
    }
    if out.get(one).is_empty() {
        out.by_slot.insert(one, item.to_string());
        return Some(one);
    }
    if out.get(two).is_empty() && out.get(one) != item {
        out.by_slot.insert(two, item.to_string());
        return Some(two);
    }
    return_to_pool(pool, item);
    None
}

/// Try to satisfy one combo segment from a single source set. A set that
/// cannot yield the full count rolls its placements back.
fn apply_segment(
    out: &mut Outfit,
    seg: &str,
    stg: &Strategy,
    pool: &mut Vec<PoolItem>,
    four_set: Option<&'static str>,
) -> bool {
    // Unknown segment names are ignored rather than failing the combo.
    let Some(sources) = segment_sources(seg, stg) else {
        return true;
    };
    let need = segment_count(seg);

    for set_name in sources {
        if Some(set_name) != four_set && used_sets(out, four_set).contains(set_name) {
            continue;
        }
        let Some(set) = catalog::set_by_name(set_name) else {
            continue;
        };

        let mut picked: Vec<(&'static str, &'static str)> = Vec::new();
        for &item in set.pieces {
            if picked.len() >= need {
                break;
            }
            match catalog::guess_slot(item) {
                Some(kind @ ("手镯" | "戒指")) => {
                    if let Some(slot) = place_pair(out, kind, item, pool) {
                        picked.push((slot, item));
                    }
                }
                guessed => {
                    let Some(slot) = guessed.or_else(|| out.first_empty_slot()) else {
                        continue;
                    };
                    if !out.get(slot).is_empty() {
                        continue;
                    }
                    if !take_exact(pool, item) {
                        continue;
                    }
                    out.by_slot.insert(slot, item.to_string());
                    picked.push((slot, item));
                }
            }
        }

        if picked.len() >= need {
            return true;
        }
        for (slot, item) in picked {
            out.by_slot.remove(slot);
            return_to_pool(pool, item);
        }
    }
    false
}

/// Phase 2: fill an outfit to eight slots following the class strategy.
fn fill_to_eight(out: &mut Outfit, role: &RoleAttributes, pool: &mut Vec<PoolItem>) {
    let need = out.missing_slots();
    if need.is_empty() {
        return;
    }
    let stg = catalog::strategy_for(&role.class);
    let four_set = four_piece_set(out);

    if let Some(stg) = stg {
        for combo in stg.combos {
            let mut trial = out.clone();
            let mut trial_pool = pool.clone();
            let mut ok = true;
            for &seg in *combo {
                let done = match seg {
                    // Phase 1 already did its best; never replace it here.
                    "4主体" => true,
                    "1轩辕之心" => {
                        if take_exact(&mut trial_pool, XUANYUAN_HEART) {
                            trial.special.insert(XUANYUAN_HEART.to_string(), 1);
                            true
                        } else {
                            false
                        }
                    }
                    seg => apply_segment(&mut trial, seg, stg, &mut trial_pool, four_set),
                };
                if !done {
                    ok = false;
                    break;
                }
            }
            // Pair validity is checked after the whole combo is laid
            // down; a combo can be abandoned this late.
            if ok && trial.pairs_valid() {
                *out = trial;
                *pool = trial_pool;
                return;
            }
        }

        // Rescue: two pieces of an unused secondary set.
        if need.len() >= 2 {
            for &set_name in stg.pri2 {
                if Some(set_name) != four_set && used_sets(out, four_set).contains(set_name) {
                    continue;
                }
                let Some(set) = catalog::set_by_name(set_name) else {
                    continue;
                };
                let missing = out.missing_slots();
                let mut picked: Vec<(&'static str, &'static str)> = Vec::new();
                for &item in set.pieces {
                    if picked.len() >= 2 {
                        break;
                    }
                    let Some(kind) = catalog::guess_slot(item) else {
                        continue;
                    };
                    let wanted = missing
                        .iter()
                        .any(|s| *s == kind || (s.starts_with(kind) && s.len() > kind.len()));
                    if !wanted {
                        continue;
                    }
                    match kind {
                        "手镯" | "戒指" => {
                            if let Some(slot) = place_pair(out, kind, item, pool) {
                                picked.push((slot, item));
                            }
                        }
                        slot => {
                            if !out.get(slot).is_empty() || !take_exact(pool, item) {
                                continue;
                            }
                            out.by_slot.insert(slot, item.to_string());
                            picked.push((slot, item));
                        }
                    }
                }
                if picked.len() >= 2 {
                    return;
                }
                for (slot, item) in picked {
                    out.by_slot.remove(slot);
                    return_to_pool(pool, item);
                }
            }
        }
    }

    // Last resort: any known-set item that fits the slot, one set each.
    for slot in SLOT_ORDER {
        if !out.get(slot).is_empty() {
            continue;
        }
        let used = used_sets(out, four_set);
        let mut chosen: Option<String> = None;
        for p in pool.iter_mut() {
            if p.count <= 0 || !item_fits(&p.name, slot, out) {
                continue;
            }
            let Some(set) = catalog::set_of_item(&p.name) else {
                continue;
            };
            if Some(set) != four_set && used.contains(set) {
                continue;
            }
            p.count -= 1;
            chosen = Some(p.name.clone());
            break;
        }
        if let Some(name) = chosen {
            out.by_slot.insert(slot, name);
        }
    }
}

fn item_fits(name: &str, slot: &str, current: &Outfit) -> bool {
    let guessed = catalog::guess_slot(name);
    let ok = match slot {
        "手镯1" | "手镯2" => guessed == Some("手镯"),
        "戒指1" | "戒指2" => guessed == Some("戒指"),
        _ => guessed == Some(slot),
    };
    if !ok {
        return false;
    }
    // Never complete a pair with the same name.
    if (slot == "手镯2" && current.get("手镯1") == name)
        || (slot == "戒指2" && current.get("戒指1") == name)
    {
        return false;
    }
    true
}

/// Compute target outfits for every role in the zone.
pub fn plan_zone(snap: &ZoneSnapshot) -> HashMap<String, Outfit> {
    let mut roles: Vec<&RoleAttributes> = snap.roles.values().collect();
    roles.sort_by(|a, b| {
        let (pa, pb) = (a.school == "天尊", b.school == "天尊");
        pb.cmp(&pa)
            .then_with(|| b.magic.cmp(&a.magic))
            .then_with(|| a.role_name.cmp(&b.role_name))
    });

    let mut pool = build_pool(&roles);
    let mut res: HashMap<String, Outfit> = HashMap::new();

    for r in &roles {
        let mut of = Outfit::default();
        if let Some(items) = take_best_four_piece(&mut pool) {
            for item in items {
                place_by_name(&mut of, item);
            }
        }
        res.insert(r.role_name.clone(), of);
    }

    for r in &roles {
        let of = res.get_mut(r.role_name.as_str()).expect("phase 1 outfit");
        fill_to_eight(of, r, &mut pool);
    }
    res
}
