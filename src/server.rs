use log::{debug, info, warn};
use std::io::{self, BufReader};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use gzembed::file_serving::{handle_file_request, Site};
use gzembed::http::Request;
use gzembed::{log_error, log_request};

use crate::args::Args;

pub fn start_server(args: Args) -> io::Result<()> {
    // Loading is all-or-nothing; any corrupt asset stops startup.
    let site = Site::load(&args.serve_dir, args.decompress).map_err(|e| {
        log_error!(e, format!("Failed to load {}", args.serve_dir.display()));
        io::Error::from(e)
    })?;
    info!(
        "Serving {} files from {} ({})",
        site.len(),
        args.serve_dir.display(),
        if args.decompress {
            "decompressed"
        } else {
            "negotiated"
        }
    );

    if site.is_empty() {
        warn!("No .gz files found under {}", args.serve_dir.display());
    }

    let listener = TcpListener::bind(&args.listen_addr)?;
    info!("Listening on: {}", args.listen_addr);

    let site = Arc::new(site);
    let index = Arc::new(args.index);

    for stream in listener.incoming() {
        let stream = stream?;
        let site = Arc::clone(&site);
        let index = Arc::clone(&index);

        thread::spawn(move || {
            if let Err(e) = handle_connection(stream, &site, &index) {
                log_error!(e, "Error handling connection");
            }
        });
    }

    Ok(())
}

fn handle_connection(mut client: TcpStream, site: &Site, index: &str) -> io::Result<()> {
    debug!("New connection from {}", client.peer_addr()?);

    let request = {
        let mut buf_reader = BufReader::new(&client);
        match Request::read_from(&mut buf_reader)? {
            Some(request) => request,
            None => {
                debug!("Connection closed before a request was sent");
                return Ok(());
            }
        }
    };
    log_request!(&request);

    handle_file_request(&mut client, site, &request, index)
}
