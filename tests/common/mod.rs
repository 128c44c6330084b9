use std::{error::Error, net::SocketAddr, sync::Arc};

use ldap3::{LdapConnAsync, Scope, SearchEntry};
use ldap_fixture::{server, Config, Directory};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

pub fn init_tracing() {
	let tracing_filter = EnvFilter::default().add_directive(LevelFilter::DEBUG.into());
	let _ = tracing_subscriber::fmt().with_env_filter(tracing_filter).with_test_writer().try_init();
}

pub async fn spawn_server(config: Config) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn Error>> {
	init_tracing();
	let directory = Arc::new(Directory::from_config(&config)?);
	let listener = TcpListener::bind("127.0.0.1:0").await?;
	let addr = listener.local_addr()?;
	let handle = tokio::spawn(async move {
		if let Err(err) = server::serve(listener, directory).await {
			panic!("Server error {err}");
		}
	});
	Ok((addr, handle))
}

pub async fn ldap_connect(addr: SocketAddr) -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, ldap) = LdapConnAsync::new(&format!("ldap://{addr}")).await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	Ok(ldap)
}

pub async fn ldap_search(
	ldap: &mut ldap3::Ldap,
	base: &str,
	scope: Scope,
	filter: &str,
) -> Result<Vec<SearchEntry>, Box<dyn Error>> {
	let (result, _res) = ldap.search(base, scope, filter, vec!["*"]).await?.success()?;
	Ok(result.into_iter().map(SearchEntry::construct).collect())
}
