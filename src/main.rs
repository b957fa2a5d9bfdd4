use stress_test::{churn, churn_scaling};
use tracing_subscriber::EnvFilter;
pub mod stress_test;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    let converged = rt.block_on(async_main())?;
    if !converged {
        eprintln!("\n✗ Some rooms did not converge to the compiled intent");
        std::process::exit(1);
    }
    Ok(())
}

async fn async_main() -> warden_sdk::Result<bool> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            RECONCILIATION CHURN TESTS                       ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut converged = true;

    // Test 1: few rooms, fast gateway
    let stats = churn(4, 50, 500, 1).await?;
    stats.print();
    converged &= stats.converged();

    // Test 2: many rooms, slow gateway
    let stats = churn(25, 500, 3000, 10).await?;
    stats.print();
    converged &= stats.converged();

    // Test 3: Scaling analysis
    converged &= churn_scaling(20, 5).await?;

    if converged {
        println!("\n✓ All churn tests converged!");
    }
    Ok(converged)
}
