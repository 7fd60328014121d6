//! Map-assignment planning: a pure function from a zone snapshot to a
//! list of (role, map, floor) targets. No side effects; the hub owns
//! dispatch and logging.

use std::collections::{HashMap, HashSet};

use fleetproto::report::RoleAttributes;

use crate::catalog;
use crate::registry::ZoneSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapTarget {
    pub map: &'static str,
    pub floor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub role_name: String,
    pub target: MapTarget,
}

/// Full difficulty ladder, high to low.
const MAPS_HIGH_TO_LOW: [&str; 11] = [
    "地下魔域", "远古逆魔", "禁地魔穴", "通天塔", "远古蛇殿", "远古机关洞",
    "玄冰古道", "五蛇殿", "机关洞", "将军坟东", "将军坟",
];

pub fn is_mage(class: &str) -> bool {
    class == "法师"
}

fn lucky_high(lucky: i64) -> bool {
    lucky >= 9
}

fn strength(r: &RoleAttributes) -> i64 {
    let mut s = r.magic;
    if lucky_high(r.lucky) {
        s += 10_000;
    }
    if r.level >= 60 {
        s += 5_000;
    }
    s
}

fn needs_level60(map: &str) -> bool {
    map == "远古逆魔" || map == "地下魔域"
}

fn is_unmerged(m: &str) -> bool {
    m.contains("未合")
}

fn is_merge1(m: &str) -> bool {
    m.contains("一合") || m.contains("第一次合区")
}

fn is_merge2to6(m: &str) -> bool {
    ["二合", "三合", "四合", "五合", "六合"].iter().any(|s| m.contains(s))
}

fn is_merge7(m: &str) -> bool {
    m.contains("七合")
}

/// Population threshold that makes a zone plannable without waiting.
pub fn needed_by_merge(merge: &str) -> usize {
    match merge {
        "未合区" => 12,
        "一合" | "一合区" | "第一次合区" => 24,
        "二合" | "三合" | "四合" | "五合" | "六合" => 48,
        "七合" | "七合以后" => 28,
        _ => 12,
    }
}

fn required_counts(
    merge: &str,
) -> (usize, Vec<MapTarget>, HashMap<&'static str, i64>) {
    match merge {
        "一合" | "一合区" | "第一次合区" => (
            24,
            vec![
                MapTarget { map: "机关洞", floor: 5 },
                MapTarget { map: "机关洞", floor: 6 },
                MapTarget { map: "远古机关洞", floor: 2 },
                MapTarget { map: "远古机关洞", floor: 3 },
            ],
            // The one-merge plan is computed dynamically from the level-60
            // census; no fixed quotas here.
            HashMap::new(),
        ),
        "二合" | "三合" | "四合" | "五合" | "六合" => (
            48,
            vec![
                MapTarget { map: "机关洞", floor: 5 },
                MapTarget { map: "机关洞", floor: 6 },
                MapTarget { map: "玄冰古道", floor: 2 },
                MapTarget { map: "玄冰古道", floor: 3 },
                MapTarget { map: "远古机关洞", floor: 2 },
                MapTarget { map: "远古机关洞", floor: 3 },
                MapTarget { map: "远古逆魔", floor: 1 },
                MapTarget { map: "远古逆魔", floor: 2 },
            ],
            HashMap::from([
                ("将军坟", 2),
                ("机关洞", 2),
                ("五蛇殿", 2),
                ("远古机关洞", 2),
                ("远古蛇殿", 3),
                ("通天塔", 6),
                ("禁地魔穴", 6),
                ("远古逆魔", 9),
                ("地下魔域", 8),
            ]),
        ),
        "七合" | "七合以后" => (
            28,
            vec![
                MapTarget { map: "地下魔域", floor: 1 },
                MapTarget { map: "地下魔域", floor: 2 },
            ],
            HashMap::from([
                ("将军坟", 1),
                ("机关洞", 1),
                ("五蛇殿", 1),
                ("远古机关洞", 1),
                ("远古蛇殿", 1),
                ("通天塔", 4),
                ("禁地魔穴", 5),
                ("远古逆魔", 6),
                ("地下魔域", 6),
            ]),
        ),
        // 未合区 and anything unrecognized.
        _ => (
            12,
            vec![
                MapTarget { map: "机关洞", floor: 5 },
                MapTarget { map: "机关洞", floor: 6 },
            ],
            HashMap::from([
                ("将军坟", 1),
                ("将军坟东", 1),
                ("机关洞", 3),
                ("五蛇殿", 5),
            ]),
        ),
    }
}

/// With too few roles, mage targets are re-ordered hardest first so the
/// strongest mages land on the hardest floors.
fn mage_insufficient_order(merge: &str) -> Vec<MapTarget> {
    let t = |map, floor| MapTarget { map, floor };
    if is_merge7(merge) {
        vec![t("地下魔域", 2), t("地下魔域", 1)]
    } else if is_merge2to6(merge) {
        vec![
            t("远古逆魔", 2), t("远古逆魔", 1),
            t("远古机关洞", 3), t("远古机关洞", 2),
            t("玄冰古道", 3), t("玄冰古道", 2),
            t("机关洞", 6), t("机关洞", 5),
        ]
    } else if is_merge1(merge) {
        vec![
            t("远古机关洞", 3), t("远古机关洞", 2),
            t("机关洞", 6), t("机关洞", 5),
        ]
    } else {
        vec![t("机关洞", 6), t("机关洞", 5)]
    }
}

/// High→low map order for the insufficient branch, per merge state.
fn other_maps_high(merge: &str) -> &'static [&'static str] {
    if is_merge7(merge) {
        &["地下魔域", "远古逆魔", "禁地魔穴", "通天塔", "远古蛇殿", "远古机关洞", "五蛇殿", "机关洞", "将军坟"]
    } else if is_merge2to6(merge) {
        &["地下魔域", "远古逆魔", "禁地魔穴", "通天塔", "远古蛇殿", "远古机关洞", "玄冰古道", "五蛇殿", "机关洞", "将军坟"]
    } else if is_merge1(merge) {
        &["通天塔", "禁地魔穴", "远古蛇殿", "五蛇殿", "机关洞", "将军坟"]
    } else {
        &["五蛇殿", "机关洞", "将军坟东", "将军坟"]
    }
}

fn sort_lucky_strength(v: &mut [&RoleAttributes]) {
    v.sort_by(|a, b| {
        let (la, lb) = (lucky_high(a.lucky), lucky_high(b.lucky));
        lb.cmp(&la).then_with(|| strength(b).cmp(&strength(a)))
    });
}

fn assignment(r: &RoleAttributes, map: &'static str, floor: i64) -> Assignment {
    Assignment {
        role_name: r.role_name.clone(),
        target: MapTarget { map, floor },
    }
}

/// Does this role currently wear four distinct slot categories of a single
/// A-tier set? Bracelet and ring pairs collapse to one category each.
fn has_a_tier_four_piece(r: &RoleAttributes) -> bool {
    let mut set_pos: HashMap<&str, HashSet<&str>> = HashMap::new();
    for e in &r.equipments {
        let Some(set) = catalog::set_of_item(&e.name) else { continue };
        if catalog::set_rank(set) < catalog::A_TIER_RANK {
            continue;
        }
        let pos = catalog::normalize_slot(&e.slot);
        set_pos.entry(set).or_default().insert(pos);
    }
    set_pos.values().any(|positions| positions.len() >= 4)
}

/// Plan one zone. Deterministic for a given snapshot: roles are ordered by
/// name before any criteria sort, so map-iteration order never leaks in.
pub fn plan(snap: &ZoneSnapshot) -> Vec<Assignment> {
    if snap.roles.is_empty() {
        return Vec::new();
    }
    let merge = snap.merge_state().to_string();

    let mut roles: Vec<&RoleAttributes> = snap.roles.values().collect();
    roles.sort_by(|a, b| a.role_name.cmp(&b.role_name));
    let mut mages: Vec<&RoleAttributes> = Vec::new();
    let mut others: Vec<&RoleAttributes> = Vec::new();
    for r in roles {
        if is_mage(&r.class) {
            mages.push(r);
        } else {
            others.push(r);
        }
    }
    mages.sort_by(|a, b| strength(b).cmp(&strength(a)));
    others.sort_by(|a, b| strength(b).cmp(&strength(a)));

    let (required, mage_fixed, other_plan) = required_counts(&merge);
    let insufficient = snap.roles.len() < required;

    let mage_targets = if insufficient {
        let t = mage_insufficient_order(&merge);
        if t.is_empty() { mage_fixed } else { t }
    } else {
        mage_fixed
    };

    let mut out = Vec::new();
    let assign_mages = mages.len().min(mage_targets.len());
    for i in 0..assign_mages {
        out.push(Assignment {
            role_name: mages[i].role_name.clone(),
            target: mage_targets[i],
        });
    }
    // Surplus mages join the others, keeping their high priority.
    let mut pool: Vec<&RoleAttributes> = mages[assign_mages..].to_vec();
    pool.extend(others);

    if insufficient {
        out.extend(assign_insufficient(&pool, &other_plan, &merge));
    } else if is_unmerged(&merge) {
        out.extend(assign_unmerged(&pool, &other_plan));
    } else if is_merge1(&merge) {
        out.extend(assign_merge1(&pool));
    } else {
        let mut plan = other_plan;
        out.extend(distribute_by_need(&pool, &mut plan));
    }
    out
}

/// Coverage+fill for under-populated zones: one body on every planned map
/// first, then drain quotas hardest-first, then overflow anybody left.
fn assign_insufficient<'a>(
    others: &[&'a RoleAttributes],
    plan: &HashMap<&'static str, i64>,
    merge: &str,
) -> Vec<Assignment> {
    if others.is_empty() {
        return Vec::new();
    }
    let mut others = others.to_vec();
    sort_lucky_strength(&mut others);

    let order = other_maps_high(merge);
    let filtered: Vec<&'static str> = if plan.is_empty() {
        order.to_vec()
    } else {
        order.iter().copied().filter(|m| plan.contains_key(m)).collect()
    };
    let mut counts: HashMap<&'static str, i64> = if plan.is_empty() {
        filtered.iter().map(|m| (*m, i64::MAX / 2)).collect()
    } else {
        plan.clone()
    };

    let mut used: HashSet<&'a str> = HashSet::new();
    let mut res = Vec::new();

    for &m in &filtered {
        if counts[m] <= 0 {
            continue;
        }
        if let Some(r) = others
            .iter()
            .find(|r| !used.contains(r.role_name.as_str()) && !(needs_level60(m) && r.level < 60))
        {
            res.push(assignment(r, m, 1));
            used.insert(r.role_name.as_str());
            *counts.get_mut(m).expect("planned map") -= 1;
        }
    }

    for &m in &filtered {
        while counts[m] > 0 {
            let Some(r) = others
                .iter()
                .find(|r| !used.contains(r.role_name.as_str()) && !(needs_level60(m) && r.level < 60))
            else {
                break;
            };
            res.push(assignment(r, m, 1));
            used.insert(r.role_name.as_str());
            *counts.get_mut(m).expect("planned map") -= 1;
        }
    }

    for r in &others {
        if used.contains(r.role_name.as_str()) {
            continue;
        }
        if let Some(m) = filtered
            .iter()
            .copied()
            .find(|m| !(needs_level60(m) && r.level < 60))
        {
            res.push(assignment(r, m, 1));
            used.insert(r.role_name.as_str());
        }
    }
    res
}

/// 未合区 with a full house: quotas keyed on how many roles wear an A-tier
/// four-piece, refined by the skill-150 census once four are geared.
fn assign_unmerged<'a>(
    others: &[&'a RoleAttributes],
    base_plan: &HashMap<&'static str, i64>,
) -> Vec<Assignment> {
    if others.is_empty() {
        return Vec::new();
    }
    let mut eligible: Vec<&RoleAttributes> = others
        .iter()
        .copied()
        .filter(|r| has_a_tier_four_piece(r))
        .collect();
    sort_lucky_strength(&mut eligible);

    let skill150 = others.iter().filter(|r| r.skill >= 150).count();

    let mut plan: HashMap<&'static str, i64> = match eligible.len().min(4) {
        0 => base_plan.clone(),
        1 => HashMap::from([("将军坟", 1), ("将军坟东", 1), ("机关洞", 3), ("五蛇殿", 4), ("通天塔", 1)]),
        2 => HashMap::from([("将军坟", 1), ("将军坟东", 1), ("机关洞", 2), ("五蛇殿", 4), ("通天塔", 2)]),
        3 => HashMap::from([("将军坟", 1), ("将军坟东", 1), ("机关洞", 2), ("五蛇殿", 3), ("通天塔", 3)]),
        _ => HashMap::from([("将军坟", 1), ("机关洞", 2), ("五蛇殿", 3), ("通天塔", 4)]),
    };
    if eligible.len() >= 4 {
        plan = match skill150 {
            0 => plan,
            1 => HashMap::from([("将军坟", 1), ("机关洞", 2), ("五蛇殿", 2), ("通天塔", 4), ("禁地魔穴", 1)]),
            2 => HashMap::from([("将军坟", 1), ("机关洞", 1), ("五蛇殿", 2), ("通天塔", 4), ("禁地魔穴", 2)]),
            3..=7 => HashMap::from([("将军坟", 1), ("机关洞", 1), ("五蛇殿", 1), ("通天塔", 4), ("禁地魔穴", 3)]),
            _ => HashMap::from([("机关洞", 1), ("五蛇殿", 1), ("通天塔", 4), ("禁地魔穴", 3), ("远古蛇殿", 1)]),
        };
    }

    let mut all = others.to_vec();
    sort_lucky_strength(&mut all);

    let mut used: HashSet<&'a str> = HashSet::new();
    let mut out = Vec::new();

    // 通天塔 belongs to the geared roles first.
    let mut tt = plan.remove("通天塔").unwrap_or(0);
    for r in &eligible {
        if tt == 0 {
            break;
        }
        if used.insert(r.role_name.as_str()) {
            out.push(assignment(r, "通天塔", 1));
            tt -= 1;
        }
    }

    for (map, need) in [("禁地魔穴", plan.remove("禁地魔穴").unwrap_or(0)), ("远古蛇殿", plan.remove("远古蛇殿").unwrap_or(0))] {
        let mut need = need;
        for r in &all {
            if need == 0 {
                break;
            }
            if !used.contains(r.role_name.as_str()) {
                used.insert(r.role_name.as_str());
                out.push(assignment(r, map, 1));
                need -= 1;
            }
        }
    }

    for map in ["五蛇殿", "机关洞", "将军坟东", "将军坟"] {
        let mut need = plan.remove(map).unwrap_or(0);
        for r in &all {
            if need == 0 {
                break;
            }
            if !used.contains(r.role_name.as_str()) {
                used.insert(r.role_name.as_str());
                out.push(assignment(r, map, 1));
                need -= 1;
            }
        }
    }

    // Not enough geared roles: give the leftover tower quota to whoever
    // remains strongest.
    for r in &all {
        if tt == 0 {
            break;
        }
        if !used.contains(r.role_name.as_str()) {
            used.insert(r.role_name.as_str());
            out.push(assignment(r, "通天塔", 1));
            tt -= 1;
        }
    }

    for r in &all {
        if !used.contains(r.role_name.as_str()) {
            used.insert(r.role_name.as_str());
            out.push(assignment(r, "五蛇殿", 1));
        }
    }
    out
}

/// 一合: seed the low maps with the five weakest, then split the level-60
/// census between 地下魔域 and 远古逆魔 and spread the rest over the tower
/// and 禁地魔穴 residuals.
fn assign_merge1<'a>(others: &[&'a RoleAttributes]) -> Vec<Assignment> {
    if others.is_empty() {
        return Vec::new();
    }
    let low = others.len().min(5);
    let split = others.len() - low;
    let tail = &others[split..];
    let rest = &others[..split];

    let mut out = Vec::new();
    let mut tail_plan: HashMap<&'static str, i64> =
        HashMap::from([("机关洞", 1), ("五蛇殿", 2), ("远古蛇殿", 2)]);
    out.extend(distribute_by_need(tail, &mut tail_plan));

    let mut sixty: Vec<&RoleAttributes> =
        rest.iter().copied().filter(|r| r.level >= 60).collect();
    sixty.sort_by(|a, b| strength(b).cmp(&strength(a)));

    let (demon, nether, tower, pit) = match sixty.len() {
        n if n >= 7 => (4, 3, 4, 4),
        6 => (3, 3, 5, 4),
        5 => (2, 3, 5, 5),
        4 => (1, 3, 6, 5),
        3 => (0, 3, 6, 6),
        2 => (0, 2, 7, 6),
        1 => (0, 1, 7, 7),
        _ => (0, 0, 8, 7),
    };

    let mut assigned: HashSet<&'a str> = HashSet::new();
    for r in sixty.iter().take(demon) {
        out.push(assignment(r, "地下魔域", 1));
        assigned.insert(r.role_name.as_str());
    }
    for r in sixty.iter().skip(demon).take(nether) {
        out.push(assignment(r, "远古逆魔", 1));
        assigned.insert(r.role_name.as_str());
    }

    let remaining: Vec<&RoleAttributes> = rest
        .iter()
        .copied()
        .filter(|r| !assigned.contains(r.role_name.as_str()))
        .collect();
    let mut residual: HashMap<&'static str, i64> =
        HashMap::from([("通天塔", tower), ("禁地魔穴", pit)]);
    out.extend(distribute_by_need(&remaining, &mut residual));
    out
}

/// Generic quota distributor: lucky-9 first, strength next; each role takes
/// the hardest map it can enter that still has a slot.
fn distribute_by_need(
    others: &[&RoleAttributes],
    plan: &mut HashMap<&'static str, i64>,
) -> Vec<Assignment> {
    let mut sorted = others.to_vec();
    sort_lucky_strength(&mut sorted);
    let mut out = Vec::new();
    for r in sorted {
        for m in MAPS_HIGH_TO_LOW {
            let Some(need) = plan.get_mut(m) else { continue };
            if *need <= 0 {
                continue;
            }
            if needs_level60(m) && r.level < 60 {
                continue;
            }
            out.push(assignment(r, m, 1));
            *need -= 1;
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn snap(roles: Vec<RoleAttributes>) -> ZoneSnapshot {
        let now = Instant::now();
        let mut map = HashMap::new();
        let mut clients = HashMap::new();
        for r in roles {
            clients.insert(r.role_name.clone(), r.client_id.clone());
            map.insert(r.role_name.clone(), r);
        }
        ZoneSnapshot {
            roles: map,
            client_by_role: clients,
            last_update: now,
            wait_alloc_until: now,
        }
    }

    fn role(name: &str, class: &str, merge: &str) -> RoleAttributes {
        RoleAttributes {
            zone: "一区".to_string(),
            role_name: name.to_string(),
            client_id: format!("C-{name}"),
            class: class.to_string(),
            merge_state: merge.to_string(),
            level: 40,
            magic: 100,
            ..Default::default()
        }
    }

    fn count_by_map(plan: &[Assignment]) -> HashMap<&'static str, usize> {
        let mut m = HashMap::new();
        for a in plan {
            *m.entry(a.target.map).or_insert(0) += 1;
        }
        m
    }

    #[test]
    fn lone_mage_takes_hardest_fixed_floor() {
        let plan = plan(&snap(vec![role("法师A", "法师", "未合区")]));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].role_name, "法师A");
        assert_eq!(plan[0].target, MapTarget { map: "机关洞", floor: 6 });
    }

    #[test]
    fn unmerged_full_house_matches_base_plan() {
        let mut roles = vec![
            role("法师甲", "法师", "未合区"),
            role("法师乙", "法师", "未合区"),
        ];
        for i in 0..10 {
            roles.push(role(&format!("战士{i:02}"), "战士", "未合区"));
        }
        let plan = plan(&snap(roles));
        assert_eq!(plan.len(), 12);

        let mage_floors: Vec<i64> = plan
            .iter()
            .filter(|a| a.target.map == "机关洞" && a.target.floor > 1)
            .map(|a| a.target.floor)
            .collect();
        assert_eq!(mage_floors.len(), 2);
        assert!(mage_floors.contains(&5) && mage_floors.contains(&6));

        let others: Vec<&Assignment> = plan.iter().filter(|a| a.target.floor == 1).collect();
        assert_eq!(others.len(), 10);
        let counts = count_by_map(&others.iter().map(|a| (*a).clone()).collect::<Vec<_>>());
        assert_eq!(counts.get("将军坟"), Some(&1));
        assert_eq!(counts.get("将军坟东"), Some(&1));
        assert_eq!(counts.get("机关洞"), Some(&3));
        assert_eq!(counts.get("五蛇殿"), Some(&5));
    }

    #[test]
    fn merge1_splits_by_level60_census() {
        // 24 non-mages; exactly five at level >= 60, and five clearly
        // weakest seeding the low maps.
        let mut roles = Vec::new();
        for i in 0..5 {
            let mut r = role(&format!("强者{i}"), "战士", "一合");
            r.level = 60;
            r.magic = 900 - i as i64;
            roles.push(r);
        }
        for i in 0..14 {
            let mut r = role(&format!("中坚{i:02}"), "战士", "一合");
            r.magic = 500 - i as i64;
            roles.push(r);
        }
        for i in 0..5 {
            let mut r = role(&format!("弱者{i}"), "道士", "一合");
            r.magic = 10 - i as i64;
            roles.push(r);
        }

        let plan = plan(&snap(roles));
        assert_eq!(plan.len(), 5 + 5 + 10);
        let counts = count_by_map(&plan);
        // Weakest five.
        assert_eq!(counts.get("机关洞"), Some(&1));
        assert_eq!(counts.get("五蛇殿"), Some(&2));
        assert_eq!(counts.get("远古蛇殿"), Some(&2));
        // n == 5 row: 2 + 3, residuals 5/5.
        assert_eq!(counts.get("地下魔域"), Some(&2));
        assert_eq!(counts.get("远古逆魔"), Some(&3));
        assert_eq!(counts.get("通天塔"), Some(&5));
        assert_eq!(counts.get("禁地魔穴"), Some(&5));

        // The two strongest sixties take the demon realm.
        let demon: HashSet<&str> = plan
            .iter()
            .filter(|a| a.target.map == "地下魔域")
            .map(|a| a.role_name.as_str())
            .collect();
        assert_eq!(demon, HashSet::from(["强者0", "强者1"]));

        // One assignment per role.
        let mut seen = HashSet::new();
        for a in &plan {
            assert!(seen.insert(a.role_name.clone()), "{} assigned twice", a.role_name);
        }
    }

    #[test]
    fn seven_merge_mages_stay_in_demon_realm() {
        let mut roles = Vec::new();
        for i in 0..2 {
            let mut r = role(&format!("法师{i}"), "法师", "七合");
            r.level = 70;
            roles.push(r);
        }
        for i in 0..26 {
            let mut r = role(&format!("战士{i:02}"), "战士", "七合");
            r.level = 65;
            roles.push(r);
        }
        let plan = plan(&snap(roles));
        for a in &plan {
            let mage = a.role_name.starts_with("法师");
            if mage {
                assert_eq!(a.target.map, "地下魔域");
                assert!(a.target.floor == 1 || a.target.floor == 2);
            } else {
                assert_eq!(a.target.floor, 1);
            }
        }
        let counts = count_by_map(&plan);
        // Fixed plan quotas sum to 26; every non-mage lands somewhere.
        assert_eq!(counts.get("将军坟"), Some(&1));
        assert_eq!(counts.get("远古逆魔"), Some(&6));
        assert_eq!(counts.get("地下魔域"), Some(&(6 + 2)));
    }

    #[test]
    fn insufficient_covers_before_filling() {
        // 6 of the 12 required: coverage puts one on each planned map
        // before any map doubles up.
        let mut roles = Vec::new();
        for i in 0..6 {
            let mut r = role(&format!("战士{i}"), "战士", "未合区");
            r.magic = 100 + i as i64;
            roles.push(r);
        }
        let plan = plan(&snap(roles));
        assert_eq!(plan.len(), 6);
        let counts = count_by_map(&plan);
        for m in ["五蛇殿", "机关洞", "将军坟东", "将军坟"] {
            assert!(counts.get(m).copied().unwrap_or(0) >= 1, "{m} uncovered");
        }
        // Strongest goes to the hardest planned map.
        let hardest = plan.iter().find(|a| a.role_name == "战士5").unwrap();
        assert_eq!(hardest.target.map, "五蛇殿");
    }

    #[test]
    fn level_gate_keeps_lowbies_out() {
        let mut roles = Vec::new();
        for i in 0..10 {
            let mut r = role(&format!("战士{i:02}"), "战士", "七合");
            r.level = if i < 3 { 70 } else { 40 };
            roles.push(r);
        }
        let plan = plan(&snap(roles));
        for a in &plan {
            if needs_level60(a.target.map) {
                let idx: usize = a.role_name[6..].parse().unwrap_or(99);
                assert!(idx < 3, "{} under-leveled for {}", a.role_name, a.target.map);
            }
        }
    }

    #[test]
    fn unmerged_geared_roles_claim_the_tower() {
        let four_piece = vec![
            ("头", "圣战头盔"),
            ("项链", "圣战项链"),
            ("腰带", "圣战腰带"),
            ("鞋子", "圣战战靴"),
        ];
        let mut roles = Vec::new();
        for i in 0..2 {
            let mut r = role(&format!("高战{i}"), "战士", "未合区");
            r.magic = 50; // weaker than the rest; gear must still win the tower
            r.equipments = four_piece
                .iter()
                .map(|(s, n)| fleetproto::report::EquipItem {
                    slot: s.to_string(),
                    name: n.to_string(),
                })
                .collect();
            roles.push(r);
        }
        for i in 0..10 {
            let mut r = role(&format!("散人{i:02}"), "战士", "未合区");
            r.magic = 800 - i as i64;
            roles.push(r);
        }
        let plan = plan(&snap(roles));
        // x = 2 row: tower quota 2, held by the geared pair.
        let tower: HashSet<&str> = plan
            .iter()
            .filter(|a| a.target.map == "通天塔")
            .map(|a| a.role_name.as_str())
            .collect();
        assert_eq!(tower, HashSet::from(["高战0", "高战1"]));
        let counts = count_by_map(&plan);
        assert_eq!(counts.get("机关洞"), Some(&2));
        // Quota 4 plus the two roles left over once the 10-slot plan runs
        // out; stragglers overflow to 五蛇殿.
        assert_eq!(counts.get("五蛇殿"), Some(&6));
        assert_eq!(plan.len(), 12);
    }

    #[test]
    fn plans_are_deterministic() {
        let mut roles = Vec::new();
        for i in 0..20 {
            let mut r = role(&format!("战士{i:02}"), "战士", "一合");
            r.magic = 300;
            roles.push(r);
        }
        let s = snap(roles);
        let a = plan(&s);
        let b = plan(&s);
        assert_eq!(a, b);
    }
}
