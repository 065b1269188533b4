//! `goalclaw agents`: the built-in profiles.

use goalclaw_agent::AgentProfile;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🤖 Available agents");
    for profile in AgentProfile::builtin() {
        println!();
        println!("   {}", profile.name);
        println!("      {}", profile.expertise);
        let functions: Vec<&str> = profile.functions.iter().map(|f| f.name()).collect();
        println!("      functions: {}", functions.join(", "));
    }
    Ok(())
}
