//! LDAP front end for a [`Directory`].
//!
//! Message framing and BER encoding come from `ldap3_proto`; this module only
//! translates decoded operations into directory calls and the results back
//! into protocol responses.
use std::{net::SocketAddr, sync::Arc};

use futures_util::{SinkExt, StreamExt};
use ldap3::Scope;
use ldap3_proto::{
	proto::{
		LdapBindCred, LdapBindRequest, LdapBindResponse, LdapCompareRequest, LdapExtendedResponse,
		LdapFilter, LdapMsg, LdapOp, LdapResult, LdapResultCode, LdapSearchRequest,
		LdapSearchResultEntry, LdapSearchScope, LdapSubstringFilter,
	},
	LdapCodec, LdapPartialAttribute,
};
use tokio::{
	io::{AsyncRead, AsyncWrite},
	net::TcpListener,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, instrument, warn};

use crate::{
	directory::{BindIdentity, Directory},
	entry::DirectoryEntry,
	error::Error,
	filter::{Filter, SubstringFilter},
	store::{Catalog, EntryStore},
};

/// Convert a decoded protocol filter into a [`Filter`]. Approximate matches
/// are treated as equality; ordering and extensible matches never match.
#[must_use]
pub fn convert_filter(filter: &LdapFilter) -> Filter {
	match filter {
		LdapFilter::And(filters) => Filter::And(filters.iter().map(convert_filter).collect()),
		LdapFilter::Or(filters) => Filter::Or(filters.iter().map(convert_filter).collect()),
		LdapFilter::Not(filter) => Filter::Not(Box::new(convert_filter(filter))),
		LdapFilter::Equality(attr, value) | LdapFilter::Approx(attr, value) => {
			Filter::Equality(attr.clone(), value.clone())
		}
		LdapFilter::Present(attr) => Filter::Present(attr.clone()),
		LdapFilter::Substring(attr, substring) => {
			Filter::Substring(attr.clone(), convert_substring(substring))
		}
		other => {
			warn!("Unsupported filter {other:?}, treating as false");
			Filter::never()
		}
	}
}

/// Convert a substring assertion.
fn convert_substring(substring: &LdapSubstringFilter) -> SubstringFilter {
	SubstringFilter {
		initial: substring.initial.clone(),
		any: substring.any.clone(),
		final_: substring.final_.clone(),
	}
}

/// Map a protocol search scope. `children` is served as a subtree search.
fn convert_scope(scope: &LdapSearchScope) -> Scope {
	match scope {
		LdapSearchScope::Base => Scope::Base,
		LdapSearchScope::OneLevel => Scope::OneLevel,
		LdapSearchScope::Subtree | LdapSearchScope::Children => Scope::Subtree,
	}
}

/// The protocol result code reported for a directory error.
fn result_code(err: &Error) -> LdapResultCode {
	match err {
		Error::MalformedDn(_) => LdapResultCode::InvalidDNSyntax,
		Error::NotFound(_) => LdapResultCode::NoSuchObject,
		Error::InvalidCredential(_) => LdapResultCode::InvalidCredentials,
		Error::BackendUnavailable(_) | Error::Config(_) | Error::Io(_) => {
			LdapResultCode::OperationsError
		}
	}
}

/// A result with an empty matched DN and no referrals.
fn make_result(code: LdapResultCode, message: String) -> LdapResult {
	LdapResult { code, matcheddn: String::new(), message, referral: vec![] }
}

/// A bind response without SASL credentials.
fn make_bind_response(code: LdapResultCode, message: String) -> LdapOp {
	LdapOp::BindResponse(LdapBindResponse { res: make_result(code, message), saslcreds: None })
}

fn make_search_done(code: LdapResultCode, message: String) -> LdapOp {
	LdapOp::SearchResultDone(make_result(code, message))
}

fn make_extended_response(code: LdapResultCode, message: String) -> LdapOp {
	LdapOp::ExtendedResponse(LdapExtendedResponse {
		res: make_result(code, message),
		name: None,
		value: None,
	})
}

/// Build a search result entry, keeping only the requested attributes. An
/// empty list or `*` selects all of them, `1.1` none.
fn make_search_entry(entry: DirectoryEntry, requested: &[String]) -> LdapOp {
	let all = requested.is_empty() || requested.iter().any(|attr| attr == "*");
	let attributes = entry
		.attributes
		.iter()
		.filter(|attr| all || requested.iter().any(|r| r.eq_ignore_ascii_case(&attr.name)))
		.map(|attr| LdapPartialAttribute {
			atype: attr.name.clone(),
			vals: attr.values.iter().map(|v| v.as_bytes().to_vec()).collect(),
		})
		.collect();
	LdapOp::SearchResultEntry(LdapSearchResultEntry { dn: entry.dn.to_string(), attributes })
}

/// Protocol state of a single client connection.
#[derive(Debug)]
pub struct LdapSession<S = Catalog> {
	/// The directory being served
	directory: Arc<Directory<S>>,
	/// Identity of the last successful bind, `None` while anonymous
	bound: Option<BindIdentity>,
}

impl<S: EntryStore> LdapSession<S> {
	/// Start an anonymous session.
	#[must_use]
	pub fn new(directory: Arc<Directory<S>>) -> Self {
		Self { directory, bound: None }
	}

	/// The identity this session is bound as.
	#[must_use]
	pub fn bound(&self) -> Option<&BindIdentity> {
		self.bound.as_ref()
	}

	/// Handle one operation. Returns the responses to send, or `None` when the
	/// session should end.
	pub fn handle_ldap_message(&mut self, op: LdapOp) -> Option<Vec<LdapOp>> {
		Some(match op {
			LdapOp::BindRequest(request) => vec![self.do_bind(&request)],
			LdapOp::SearchRequest(request) => self.do_search(&request),
			LdapOp::CompareRequest(request) => vec![self.do_compare(&request)],
			LdapOp::UnbindRequest => {
				debug!("Unbind request");
				self.bound = None;
				return None;
			}
			op => {
				warn!("Unsupported operation: {op:?}");
				vec![make_extended_response(
					LdapResultCode::UnwillingToPerform,
					"Unsupported operation".to_owned(),
				)]
			}
		})
	}

	/// Handle a bind request, updating the bound identity.
	fn do_bind(&mut self, request: &LdapBindRequest) -> LdapOp {
		// Any new bind attempt resets the session to anonymous first.
		self.bound = None;
		let password = match &request.cred {
			LdapBindCred::Simple(password) => password,
			_ => {
				return make_bind_response(
					LdapResultCode::InappropriateAuthentication,
					"Only simple binds are supported".to_owned(),
				)
			}
		};
		if request.dn.is_empty() {
			if !password.is_empty() {
				// Unauthenticated bind, see RFC 4513 section 5.1.2.
				return make_bind_response(
					LdapResultCode::UnwillingToPerform,
					"Unauthenticated binds are not allowed".to_owned(),
				);
			}
			debug!("Anonymous bind");
			return make_bind_response(LdapResultCode::Success, String::new());
		}
		match self.directory.bind(&request.dn, password) {
			Ok(identity) => {
				self.bound = Some(identity);
				make_bind_response(LdapResultCode::Success, String::new())
			}
			Err(err) => make_bind_response(result_code(&err), err.to_string()),
		}
	}

	/// Run a search and return its entries followed by the final result.
	fn do_search(&self, request: &LdapSearchRequest) -> Vec<LdapOp> {
		let filter = convert_filter(&request.filter);
		let scope = convert_scope(&request.scope);
		let result = self.directory.search(&request.base, scope, &filter);
		match result {
			Ok(entries) => {
				let mut results: Vec<LdapOp> =
					entries.map(|entry| make_search_entry(entry, &request.attrs)).collect();
				debug!("Search returned {} entries", results.len());
				results.push(make_search_done(LdapResultCode::Success, String::new()));
				results
			}
			Err(err) => {
				warn!("Search failed: {err}");
				vec![make_search_done(result_code(&err), err.to_string())]
			}
		}
	}

	/// Answer a compare request.
	fn do_compare(&self, request: &LdapCompareRequest) -> LdapOp {
		let value = String::from_utf8_lossy(&request.val);
		let code = match self.directory.compare(&request.dn, &request.atype, &value) {
			Ok(true) => LdapResultCode::CompareTrue,
			Ok(false) => LdapResultCode::CompareFalse,
			Err(err) => {
				return LdapOp::CompareResult(make_result(result_code(&err), err.to_string()))
			}
		};
		LdapOp::CompareResult(LdapResult {
			code,
			matcheddn: request.dn.clone(),
			message: String::new(),
			referral: vec![],
		})
	}
}

/// Run a session over `stream` until the client unbinds or disconnects.
#[instrument(skip_all, level = "info", fields(peer = %peer))]
async fn handle_ldap_stream<Stream, S>(
	stream: Stream,
	peer: SocketAddr,
	directory: Arc<Directory<S>>,
) -> Result<(), Error>
where
	Stream: AsyncRead + AsyncWrite,
	S: EntryStore,
{
	let (r, w) = tokio::io::split(stream);
	let mut requests = FramedRead::new(r, LdapCodec::default());
	let mut resp = FramedWrite::new(w, LdapCodec::default());
	let mut session = LdapSession::new(directory);

	info!("LDAP session start");
	while let Some(msg) = requests.next().await {
		let msg = msg?;
		if !matches!(msg.op, LdapOp::BindRequest(_)) {
			debug!(msgid = msg.msgid, "Received {:?}", msg.op);
		}
		let Some(responses) = session.handle_ldap_message(msg.op) else {
			break;
		};
		for op in responses {
			resp.send(LdapMsg { msgid: msg.msgid, op, ctrl: vec![] }).await?;
		}
		resp.flush().await?;
	}
	info!("LDAP session end");
	Ok(())
}

/// Accept connections on `listener` forever, serving each one on its own
/// task. Failing to accept a single connection is logged and skipped.
pub async fn serve<S>(listener: TcpListener, directory: Arc<Directory<S>>) -> Result<(), Error>
where
	S: EntryStore + 'static,
{
	info!("LDAP server listening on {}", listener.local_addr()?);
	loop {
		let (stream, peer) = match listener.accept().await {
			Ok(connection) => connection,
			Err(err) => {
				warn!("Failed to accept connection: {err}");
				continue;
			}
		};
		let directory = Arc::clone(&directory);
		tokio::spawn(async move {
			if let Err(err) = handle_ldap_stream(stream, peer, directory).await {
				error!("LDAP session with {peer} failed: {err}");
			}
		});
	}
}
