use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "Happy", "Kind", "Brave", "Cozy", "Little", "Fine", "Sweet", "Calm", "Quick", "Clever",
    "Swift", "Wise", "Warm", "Quiet", "Merry", "Neat", "Bold", "Mild", "Fresh", "Nimble",
    "Smart", "Friendly", "Cheerful", "Skilled", "Plucky", "Lively", "Jolly", "Witty", "Steady",
    "Gentle",
];

const ANIMALS: &[&str] = &[
    "Penguin", "Rabbit", "Owl", "Koala", "Panda", "Squirrel", "Seal", "Otter", "Flamingo",
    "Raccoon", "Moose", "Fox", "Hare", "Mouse", "Goose", "Swan", "Polar Bear", "Deer", "Lamb",
    "Cat", "Hamster", "Turtle", "Dolphin", "Butterfly", "Ladybug", "Parrot", "Giraffe", "Frog",
    "Pegasus", "Unicorn",
];

/// Random "Adjective Animal" display name for anonymous askers.
pub fn generate_nickname() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Curious");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Owl");
    format!("{adjective} {animal}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_is_adjective_then_animal() {
        for _ in 0..50 {
            let nickname = generate_nickname();
            let (adjective, animal) = nickname.split_once(' ').expect("two parts");
            assert!(ADJECTIVES.contains(&adjective), "{nickname}");
            assert!(ANIMALS.contains(&animal), "{nickname}");
        }
    }
}
