//! The benchmark problems. Pure data: initial facts, goals and operator
//! schemas, built on the `strips` and `htn` types.

use crate::htn::{Hla, RefinementLibrary, Resources, SchedulingProblem};
use crate::logic::Literal;
use crate::strips::{ActionSchema, Problem};

fn lits(texts: &[&str]) -> Vec<Literal> {
    texts
        .iter()
        .map(|t| Literal::parse(t).expect("malformed builtin literal"))
        .collect()
}

fn problem(init: &[&str], goals: &[&str], actions: Vec<ActionSchema>) -> Problem {
    Problem::new(lits(init), lits(goals), actions).expect("malformed builtin problem")
}

/// Two cargos, two planes, two airports; swap the cargos' locations.
pub fn air_cargo() -> Problem {
    problem(
        &[
            "At(C1, SFO)",
            "At(C2, JFK)",
            "At(P1, SFO)",
            "At(P2, JFK)",
            "Cargo(C1)",
            "Cargo(C2)",
            "Plane(P1)",
            "Plane(P2)",
            "Airport(SFO)",
            "Airport(JFK)",
        ],
        &["At(C1, JFK)", "At(C2, SFO)"],
        vec![
            ActionSchema::new(
                "Load(c, p, a)",
                &["At(c, a)", "At(p, a)", "Cargo(c)", "Plane(p)", "Airport(a)"],
                &["In(c, p)", "NotAt(c, a)"],
            )
            .unwrap(),
            ActionSchema::new(
                "Unload(c, p, a)",
                &["In(c, p)", "At(p, a)", "Cargo(c)", "Plane(p)", "Airport(a)"],
                &["At(c, a)", "NotIn(c, p)"],
            )
            .unwrap(),
            ActionSchema::new(
                "Fly(p, f, to)",
                &["At(p, f)", "Plane(p)", "Airport(f)", "Airport(to)"],
                &["At(p, to)", "NotAt(p, f)"],
            )
            .unwrap(),
        ],
    )
}

/// Move the spare from the trunk onto the axle. `LeaveOvernight` undoes
/// everything and never helps; it exists to exercise mutex detection.
pub fn spare_tire() -> Problem {
    problem(
        &["Tire(Flat)", "Tire(Spare)", "At(Flat, Axle)", "At(Spare, Trunk)"],
        &["At(Spare, Axle)", "At(Flat, Ground)"],
        vec![
            ActionSchema::new(
                "Remove(obj, loc)",
                &["At(obj, loc)"],
                &["At(obj, Ground)", "NotAt(obj, loc)"],
            )
            .unwrap(),
            ActionSchema::new(
                "PutOn(t, Axle)",
                &["Tire(t)", "At(t, Ground)", "NotAt(Flat, Axle)"],
                &["At(t, Axle)", "NotAt(t, Ground)"],
            )
            .unwrap(),
            ActionSchema::new(
                "LeaveOvernight",
                &[],
                &[
                    "NotAt(Spare, Ground)",
                    "NotAt(Spare, Axle)",
                    "NotAt(Spare, Trunk)",
                    "NotAt(Flat, Ground)",
                    "NotAt(Flat, Axle)",
                    "NotAt(Flat, Trunk)",
                ],
            )
            .unwrap(),
        ],
    )
}

/// The Sussman anomaly: stack A on B on C starting from C on A.
pub fn three_block_tower() -> Problem {
    problem(
        &[
            "On(A, Table)",
            "On(B, Table)",
            "On(C, A)",
            "Block(A)",
            "Block(B)",
            "Block(C)",
            "Clear(B)",
            "Clear(C)",
        ],
        &["On(A, B)", "On(B, C)"],
        vec![
            ActionSchema::new(
                "Move(b, x, y)",
                &["On(b, x)", "Clear(b)", "Clear(y)", "Block(b)", "Block(y)"],
                &["On(b, y)", "Clear(x)", "NotOn(b, x)", "NotClear(y)"],
            )
            .unwrap(),
            ActionSchema::new(
                "MoveToTable(b, x)",
                &["On(b, x)", "Clear(b)", "Block(b)"],
                &["On(b, Table)", "Clear(x)", "NotOn(b, x)"],
            )
            .unwrap(),
        ],
    )
}

/// Have the cake and eat it too. The smallest problem needing two layers.
pub fn have_cake_and_eat_cake_too() -> Problem {
    problem(
        &["Have(Cake)"],
        &["Have(Cake)", "Eaten(Cake)"],
        vec![
            ActionSchema::new("Eat(Cake)", &["Have(Cake)"], &["Eaten(Cake)", "NotHave(Cake)"]).unwrap(),
            ActionSchema::new("Bake(Cake)", &["NotHave(Cake)"], &["Have(Cake)"]).unwrap(),
        ],
    )
}

/// Buy milk, bananas and a drill from the right stores.
pub fn shopping_problem() -> Problem {
    problem(
        &["At(Home)", "Sells(SM, Milk)", "Sells(SM, Banana)", "Sells(HW, Drill)"],
        &["Have(Milk)", "Have(Banana)", "Have(Drill)"],
        vec![
            ActionSchema::new("Buy(x, store)", &["At(store)", "Sells(store, x)"], &["Have(x)"]).unwrap(),
            ActionSchema::new("Go(x, y)", &["At(x)"], &["At(y)", "NotAt(x)"]).unwrap(),
        ],
    )
}

/// Doubles tennis: return the ball and cover both net positions. The goals
/// contain variables, so only execution-style goal checks apply.
pub fn double_tennis_problem() -> Problem {
    problem(
        &[
            "At(A, LeftBaseLine)",
            "At(B, RightNet)",
            "Approaching(Ball, RightBaseLine)",
            "Partner(A, B)",
            "Partner(B, A)",
        ],
        &["Returned(Ball)", "At(a, LeftNet)", "At(a, RightNet)"],
        vec![
            ActionSchema::new(
                "Hit(actor, Ball, loc)",
                &["Approaching(Ball, loc)", "At(actor, loc)"],
                &["Returned(Ball)"],
            )
            .unwrap(),
            ActionSchema::new("Go(actor, to, loc)", &["At(actor, loc)"], &["At(actor, to)", "NotAt(actor, loc)"])
                .unwrap(),
        ],
    )
}

/// Job-shop assembly of two cars under shared tooling: one engine hoist, two
/// wheel stations, two inspectors and a finite stock of lug nuts. Each car's
/// tasks form a job group and must run engine, wheels, inspection in order.
pub fn job_shop_problem() -> SchedulingProblem {
    let absent_effect = |name: &str, effect: &str| {
        ActionSchema::new(name, &[], &[effect])
            .unwrap()
            .with_absent(&[effect])
            .unwrap()
    };
    let tasks = vec![
        Hla::new(absent_effect("AddEngine1", "Has(C1, E1)"))
            .with_duration(30)
            .using("EngineHoists", 1),
        Hla::new(absent_effect("AddEngine2", "Has(C2, E2)"))
            .with_duration(60)
            .using("EngineHoists", 1),
        Hla::new(absent_effect("AddWheels1", "Has(C1, W1)"))
            .with_duration(30)
            .using("WheelStations", 1)
            .consuming("LugNuts", 20),
        Hla::new(absent_effect("AddWheels2", "Has(C2, W2)"))
            .with_duration(15)
            .using("WheelStations", 1)
            .consuming("LugNuts", 20),
        Hla::new(absent_effect("Inspect1", "Inspected(C1)"))
            .with_duration(10)
            .using("Inspectors", 1),
        Hla::new(absent_effect("Inspect2", "Inspected(C2)"))
            .with_duration(10)
            .using("Inspectors", 1),
    ];
    let resources: Resources = [
        ("EngineHoists".to_string(), 1),
        ("WheelStations".to_string(), 2),
        ("Inspectors".to_string(), 2),
        ("LugNuts".to_string(), 500),
    ]
    .into_iter()
    .collect();
    SchedulingProblem {
        init: lits(&[
            "Car(C1)",
            "Car(C2)",
            "Wheels(W1)",
            "Wheels(W2)",
            "Engine(E1)",
            "Engine(E2)",
        ]),
        tasks,
        goals: lits(&[
            "Has(C1, W1)",
            "Has(C1, E1)",
            "Inspected(C1)",
            "Has(C2, W2)",
            "Has(C2, E2)",
            "Inspected(C2)",
        ]),
        job_groups: vec![
            vec!["AddEngine1".into(), "AddWheels1".into(), "Inspect1".into()],
            vec!["AddEngine2".into(), "AddWheels2".into(), "Inspect2".into()],
        ],
        resources,
    }
}

/// Getting from home to the airport, hierarchically: the abstract `Go` task
/// refines into either drive-and-shuttle or a taxi ride.
pub fn go_to_sfo() -> (SchedulingProblem, RefinementLibrary) {
    let drive = Hla::new(
        ActionSchema::new(
            "Drive(Home, SFOLongTermParking)",
            &["At(Home)", "Have(Car)"],
            &["At(SFOLongTermParking)", "NotAt(Home)"],
        )
        .unwrap(),
    );
    let shuttle = Hla::new(
        ActionSchema::new(
            "Shuttle(SFOLongTermParking, SFO)",
            &["At(SFOLongTermParking)"],
            &["At(SFO)", "NotAt(SFOLongTermParking)"],
        )
        .unwrap(),
    );
    let taxi = Hla::new(
        ActionSchema::new("Taxi(Home, SFO)", &["At(Home)"], &["At(SFO)", "NotAt(Home)"]).unwrap(),
    );
    // The abstract task carries no effects; its refinements do the work.
    let go = Hla::new(ActionSchema::new("Go(Home, SFO)", &["At(Home)"], &[]).unwrap());

    let library = RefinementLibrary::new()
        .add("Go", vec![drive, shuttle])
        .add("Go", vec![taxi]);
    let problem = SchedulingProblem {
        init: lits(&["At(Home)", "Have(Car)"]),
        tasks: vec![go],
        goals: lits(&["At(SFO)"]),
        job_groups: Vec::new(),
        resources: Resources::new(),
    };
    (problem, library)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_problem_builds() {
        for p in [
            air_cargo(),
            spare_tire(),
            three_block_tower(),
            have_cake_and_eat_cake_too(),
            shopping_problem(),
            double_tennis_problem(),
        ] {
            assert!(!p.actions.is_empty());
            assert!(!p.goal_holds(&p.initial_state()), "goal already true in {:?}", p.goals);
        }
    }

    #[test]
    fn tennis_goals_bind_per_conjunct() {
        // `a` may bind to different players in different conjuncts, so the
        // goal holds once the ball is returned with both net spots covered.
        let p = double_tennis_problem();
        let mut kb = p.initial_state();
        kb.tell(Literal::parse("Returned(Ball)").unwrap());
        kb.tell(Literal::parse("At(A, LeftNet)").unwrap());
        assert!(p.goal_holds(&kb));
    }
}
